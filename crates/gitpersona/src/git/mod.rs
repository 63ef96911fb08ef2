//! Git support for GitPersona
//!
//! - [`GitConfigAdapter`]: read/write `user.name`, `user.email`,
//!   `user.signingkey` and `commit.gpgsign` for a working directory
//! - [`SubmoduleWalker`]: discover initialized submodules and propagate an
//!   identity into them
//!
//! All git invocations go through the allowlisted
//! [`crate::process::ProcessRunner`].

mod config;
mod submodule;

pub use config::{
    COMMIT_GPG_SIGN, GitConfig, GitConfigAdapter, ReadScope, USER_EMAIL, USER_NAME,
    USER_SIGNING_KEY, match_email,
};
pub use submodule::{ApplyReport, Submodule, SubmoduleWalker, parse_status};
