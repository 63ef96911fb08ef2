//! Logging infrastructure for GitPersona
//!
//! Structured logging goes through the `tracing` crate. This module adds the
//! pieces that are specific to an identity switcher:
//!
//! - **Redaction**: command arguments can carry key paths and signing key ids,
//!   so values are sanitized, home-relative and truncated before they are logged.
//! - **Audit sink**: security events (allowlist rejections, unsafe key paths)
//!   are written to the dedicated [`AUDIT_TARGET`] so they are kept even when
//!   the regular log level is quiet.
//!
//! # Log Levels
//!
//! - **ERROR**: a switch failed
//! - **WARN**: recoverable issues (skipped identity records, submodule failures)
//! - **INFO**: identity detected or switched
//! - **DEBUG**: every external process invocation
//! - **SECURITY**: audit events only

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `tracing` target used for security audit events.
pub const AUDIT_TARGET: &str = "gitpersona::audit";

/// Log level as named in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Security,
}

impl LogLevel {
    /// `EnvFilter`-compatible directive for this level.
    pub fn filter_directive(self) -> String {
        match self {
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Info => "info".to_string(),
            LogLevel::Warn => "warn".to_string(),
            LogLevel::Error => "error".to_string(),
            LogLevel::Security => format!("error,{AUDIT_TARGET}=warn"),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Security => "SECURITY",
        };
        f.write_str(name)
    }
}

/// Configuration for log redaction
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact sensitive data from logs (default: true)
    pub redact_sensitive: bool,

    /// Command-line flags whose following argument is always redacted
    pub redact_after_flags: HashSet<String>,

    /// Home directory, replaced by `~` in logged paths
    pub home_dir: Option<PathBuf>,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            redact_sensitive: true,
            redact_after_flags: HashSet::new(),
            home_dir: dirs::home_dir(),
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable sensitive data redaction (UNSAFE - use only for debugging)
    pub fn unsafe_disable_redaction(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }

    /// Always redact the argument that follows `flag`
    pub fn redact_after(mut self, flag: impl Into<String>) -> Self {
        self.redact_after_flags.insert(flag.into());
        self
    }

    /// Override the home directory used for path shortening
    pub fn home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Redact a value if it appears sensitive, then truncate it.
    pub fn redact_value<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if self.redact_sensitive && is_likely_secret(value) {
            return Cow::Borrowed("[REDACTED]");
        }
        self.truncate(value)
    }

    /// Replace the home directory prefix of a path with `~`.
    pub fn redact_path<'a>(&self, path: &'a str) -> Cow<'a, str> {
        if self.redact_sensitive {
            if let Some(home) = self.home_dir.as_ref().and_then(|h| h.to_str()) {
                if !home.is_empty() && home != "/" {
                    if let Some(rest) = path.strip_prefix(home) {
                        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') {
                            return Cow::Owned(format!("~{rest}"));
                        }
                    }
                }
            }
        }
        self.truncate(path)
    }

    /// Render a command and its arguments as a single log-safe string.
    pub fn format_command(&self, command: &str, args: &[String]) -> String {
        let mut out = sanitize_for_log(command);
        let mut redact_next = false;
        for arg in args {
            out.push(' ');
            if redact_next && self.redact_sensitive {
                out.push_str("[REDACTED]");
                redact_next = false;
                continue;
            }
            redact_next = self.redact_after_flags.contains(arg.as_str());
            let shown = self.redact_value(arg);
            let shown = self.redact_path(&shown).into_owned();
            out.push_str(&sanitize_for_log(&shown));
        }
        out
    }

    /// Truncate value if it exceeds max length
    ///
    /// Handles UTF-8 char boundaries properly to avoid panics on multi-byte chars.
    fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// Check if a value looks like a secret (tokens, private key material)
fn is_likely_secret(value: &str) -> bool {
    let trimmed = value.trim();

    if trimmed.contains("PRIVATE KEY") {
        return true;
    }

    let prefixes = ["ghp_", "gho_", "ghu_", "ghs_", "ghr_", "glpat-", "sk-", "AKIA"];
    for prefix in prefixes {
        if trimmed.starts_with(prefix) && trimmed.len() > prefix.len() + 10 {
            return true;
        }
    }

    trimmed.len() >= 32 && is_high_entropy(trimmed)
}

/// High ratio of unique chars suggests random data
fn is_high_entropy(s: &str) -> bool {
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return false;
    }

    let unique: HashSet<char> = s.chars().collect();
    let ratio = unique.len() as f64 / s.len() as f64;
    ratio > 0.5 && unique.len() > 15
}

/// Escape characters that could be used for log injection.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect()
}

/// Security audit sink.
pub mod audit {
    use super::{AUDIT_TARGET, sanitize_for_log};

    /// Record a security event. `kind` is a short stable identifier.
    pub fn security_event(kind: &str, detail: &str) {
        tracing::warn!(
            target: AUDIT_TARGET,
            event = kind,
            detail = %sanitize_for_log(detail),
            "security event"
        );
    }
}
