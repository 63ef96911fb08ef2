//! GitPersona - Switch between Git identities per repository
//!
//! Keeps the git author identity (name, email, optional GPG signing key) and
//! the SSH agent key aligned with a user-selected identity for the current
//! workspace, propagating the identity into submodules.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gitpersona::{
//!     IdentityResolver, IdentityStore, JsonFileProvider, JsonStateStore, SecureProcessRunner,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workspace = std::env::current_dir()?;
//!     let store = IdentityStore::new(Arc::new(JsonFileProvider::new("settings.json")));
//!     let state = Arc::new(JsonStateStore::new("state.json", &workspace));
//!     let runner = Arc::new(SecureProcessRunner::new());
//!
//!     let mut resolver = IdentityResolver::new(store, runner, state, Some(workspace));
//!     if resolver.detect_current().await.is_none() {
//!         resolver.switch_to_id("work").await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Security model
//!
//! Every external command goes through [`SecureProcessRunner`], which only
//! executes argument vectors matching [`CommandAllowlist`]: never a shell,
//! never `git config --global`, never keys other than the identity keys.
//! Rejections are logged on the [`logging_impl::AUDIT_TARGET`] target.

mod cancel;
mod error;
pub mod git;
mod identity;
mod limits;
pub mod logging_impl;
pub mod process;
mod resolver;
pub mod settings;
pub mod ssh;
mod state;
mod store;

pub use cancel::CancelFlag;
pub use error::{Error, Result};
pub use git::{ApplyReport, GitConfig, GitConfigAdapter, ReadScope, Submodule, SubmoduleWalker};
pub use identity::{Identity, expand_home, key_file_name, validate_id, validate_key_path};
pub use limits::{ProcessLimits, RunOptions};
pub use logging_impl::{LogConfig, LogLevel, audit};
pub use process::{
    CommandAllowlist, CommandMatch, ProcessOutput, ProcessRunner, SecureProcessRunner,
};
pub use resolver::{
    DetectionSource, IdentityResolver, ResolverState, SwitchOutcome, SwitchReport,
};
pub use settings::{
    ConfigurationProvider, JsonFileProvider, LoggingSettings, MemoryProvider, Settings,
};
pub use ssh::{AgentKey, SshAgentAdapter};
pub use state::{CURRENT_IDENTITY_KEY, JsonStateStore, MemoryStateStore, StateStore};
pub use store::IdentityStore;
