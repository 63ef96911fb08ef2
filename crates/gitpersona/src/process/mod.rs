//! External process execution for GitPersona
//!
//! All calls to `git`, `ssh-add` and `ssh-keygen` go through a
//! [`ProcessRunner`].
//!
//! # Security Model
//!
//! - **No shell**: arguments are handed to the OS as a list, never joined
//!   into a command string
//! - **Allowlist**: every `(command, args)` pair is validated by
//!   [`CommandAllowlist`] before spawning; rejections fail with
//!   [`crate::Error::CommandBlocked`] and are written to the audit log
//! - **Bounded**: timeouts and output caps from [`crate::ProcessLimits`]
//! - **Local scope only**: git config writes must carry `--local`

mod allowlist;
mod runner;

pub use allowlist::{
    ALLOWED_CONFIG_KEYS, APPLE_KEYCHAIN_FLAG, CommandAllowlist, CommandMatch, GIT, SSH_ADD,
    SSH_KEYGEN,
};
pub use runner::{ProcessOutput, ProcessRunner, SecureProcessRunner, args};

pub(crate) use runner::PROBE_TIMEOUT;
