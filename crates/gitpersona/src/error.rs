//! Error types for GitPersona
//!
//! This module provides error types for the identity pipeline with the following design goals:
//! - Human-readable error messages for users
//! - No leakage of unbounded process output into messages
//! - Clear categorization for programmatic handling

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using GitPersona's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of stderr bytes carried inside an [`Error::ExecutionFailure`].
pub(crate) const MAX_STDERR_IN_ERROR: usize = 512;

/// GitPersona error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A write was attempted outside a Git working tree.
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// The command allowlist rejected an invocation.
    ///
    /// Always a security event. Never retried.
    #[error("command blocked: {command}: {reason}")]
    CommandBlocked { command: String, reason: String },

    /// An external process did not finish in time.
    #[error("{command} timed out after {timeout:?}")]
    ProcessTimeout { command: String, timeout: Duration },

    /// An external process produced more output than allowed.
    #[error("{command} produced more than {limit} bytes of output")]
    OutputTooLarge { command: String, limit: usize },

    /// An external process exited with a non-zero status.
    #[error("{command} failed{}: {stderr}", code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    ExecutionFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external process could not be started.
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Some submodules could not be updated.
    #[error("identity applied partially: {failed} of {total} submodules failed")]
    PartialSubmoduleFailure { failed: usize, total: usize },

    /// An identity record failed validation.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// No configured identity has the requested id.
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    /// Settings could not be read or written.
    #[error("settings error: {0}")]
    Settings(String),

    /// The persisted workspace state could not be read or written.
    #[error("state error: {0}")]
    State(String),

    /// I/O error from filesystem operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an execution failure, bounding the captured stderr.
    pub(crate) fn execution_failure(
        command: impl Into<String>,
        code: Option<i32>,
        stderr: &str,
    ) -> Self {
        let mut stderr = stderr.trim().to_string();
        if stderr.len() > MAX_STDERR_IN_ERROR {
            let mut end = MAX_STDERR_IN_ERROR;
            while end > 0 && !stderr.is_char_boundary(end) {
                end -= 1;
            }
            stderr.truncate(end);
            stderr.push_str("...");
        }
        Self::ExecutionFailure {
            command: command.into(),
            code,
            stderr: crate::logging_impl::sanitize_for_log(&stderr),
        }
    }

    /// True for allowlist rejections.
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::CommandBlocked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failure_truncates_stderr() {
        let err = Error::execution_failure("git", Some(1), &"x".repeat(4096));
        match err {
            Error::ExecutionFailure { stderr, code, .. } => {
                assert_eq!(code, Some(1));
                assert!(stderr.len() <= MAX_STDERR_IN_ERROR + 3);
                assert!(stderr.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_execution_failure_escapes_newlines() {
        let err = Error::execution_failure("git", None, "line1\nline2");
        let msg = err.to_string();
        assert!(msg.contains("line1\\nline2"));
        assert!(!msg.contains("exit code"));
    }

    #[test]
    fn test_command_blocked_is_security_event() {
        let err = Error::CommandBlocked {
            command: "git".to_string(),
            reason: "push is not allowed".to_string(),
        };
        assert!(err.is_security_event());
        assert!(!Error::NotARepository(PathBuf::from("/tmp")).is_security_event());
    }
}
