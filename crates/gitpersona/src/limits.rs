//! Resource limits for external process execution
//!
//! These limits keep a misbehaving `git` or `ssh-add` from hanging the
//! switcher or buffering unbounded output.

use std::time::Duration;

/// Default process timeout (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default output cap per stream (1 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Maximum allowed timeout (10 minutes)
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// Minimum allowed timeout configured through [`ProcessLimits::timeout`]
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Resource limits applied to every external process call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLimits {
    /// Wall-clock timeout for one process
    /// Default: 30 seconds
    pub timeout: Duration,

    /// Maximum bytes read from stdout (and separately from stderr)
    /// Default: 1 MiB
    pub max_output_bytes: usize,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl ProcessLimits {
    /// Create new limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process timeout, clamped to [`MIN_TIMEOUT`]..=[`MAX_TIMEOUT`]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
        self
    }

    /// Set the output cap (at least one byte)
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes.max(1);
        self
    }
}

/// Per-call overrides for [`ProcessLimits`] and the working directory.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory for the child. `None` inherits the caller's.
    pub cwd: Option<std::path::PathBuf>,
    /// Overrides [`ProcessLimits::timeout`] for this call.
    pub timeout: Option<Duration>,
    /// Overrides [`ProcessLimits::max_output_bytes`] for this call.
    pub max_output_bytes: Option<usize>,
}

impl RunOptions {
    /// Options that run the command inside `dir`.
    pub fn in_dir(dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            cwd: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Set a per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a per-call output cap.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Resolve the effective timeout and output cap against `limits`.
    pub(crate) fn effective(&self, limits: &ProcessLimits) -> (Duration, usize) {
        (
            self.timeout.unwrap_or(limits.timeout),
            self.max_output_bytes.unwrap_or(limits.max_output_bytes),
        )
    }
}
