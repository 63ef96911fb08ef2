//! Allowlisted process execution.
//!
//! Arguments are always passed to the child as a discrete list. No shell is
//! involved, so no argument is ever re-interpreted.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::allowlist::{CommandAllowlist, CommandMatch};
use crate::error::{Error, Result};
use crate::limits::{ProcessLimits, RunOptions};
use crate::logging_impl::{LogConfig, audit};

/// Captured output of a successful process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes external commands.
///
/// Adapters hold an `Arc<dyn ProcessRunner>`; [`SecureProcessRunner`] is the
/// production implementation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` with `args`.
    ///
    /// A non-zero exit status is reported as [`Error::ExecutionFailure`].
    async fn run(&self, command: &str, args: &[String], options: &RunOptions)
    -> Result<ProcessOutput>;
}

/// Process runner that enforces the [`CommandAllowlist`] and [`ProcessLimits`].
///
/// Each call spawns exactly one child; there is no pooling.
#[derive(Debug, Clone)]
pub struct SecureProcessRunner {
    allowlist: CommandAllowlist,
    limits: ProcessLimits,
    log: LogConfig,
}

impl Default for SecureProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureProcessRunner {
    /// Create a runner with the standard allowlist and default limits.
    pub fn new() -> Self {
        Self::with_limits(ProcessLimits::default())
    }

    /// Create a runner with custom limits.
    pub fn with_limits(limits: ProcessLimits) -> Self {
        Self {
            allowlist: CommandAllowlist::new(),
            limits,
            log: LogConfig::new().redact_after("user.signingkey"),
        }
    }

    /// Limits applied when a call does not override them.
    pub fn limits(&self) -> &ProcessLimits {
        &self.limits
    }

    async fn spawn_and_collect(
        &self,
        command: &str,
        args: &[String],
        options: &RunOptions,
        max_output: usize,
    ) -> Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: command.to_string(),
            source,
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (out, err) = tokio::try_join!(
            read_capped(stdout, max_output, command),
            read_capped(stderr, max_output, command),
        )?;
        let status = child.wait().await?;
        Ok((status, out, err))
    }
}

#[async_trait]
impl ProcessRunner for SecureProcessRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<ProcessOutput> {
        let rendered = self.log.format_command(command, args);

        // Check allowlist BEFORE spawning anything
        if let CommandMatch::Blocked { reason } = self.allowlist.check(command, args) {
            audit::security_event("command_blocked", &format!("{rendered}: {reason}"));
            return Err(Error::CommandBlocked {
                command: command.to_string(),
                reason,
            });
        }

        let (timeout, max_output) = options.effective(&self.limits);
        tracing::debug!(command = %rendered, ?timeout, "running process");

        let collected = tokio::time::timeout(
            timeout,
            self.spawn_and_collect(command, args, options, max_output),
        )
        .await;

        let (status, stdout, stderr) = match collected {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(command = %rendered, ?timeout, "process timed out");
                return Err(Error::ProcessTimeout {
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        let output = ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };

        if !status.success() {
            tracing::debug!(command = %rendered, code = ?status.code(), "process exited with failure");
            return Err(Error::execution_failure(
                command,
                status.code(),
                &output.stderr,
            ));
        }
        Ok(output)
    }
}

/// Read a child stream, failing once more than `cap` bytes arrive.
async fn read_capped<R>(stream: Option<R>, cap: usize, command: &str) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    let limit = u64::try_from(cap).unwrap_or(u64::MAX).saturating_add(1);
    stream.take(limit).read_to_end(&mut buf).await?;
    if buf.len() > cap {
        return Err(Error::OutputTooLarge {
            command: command.to_string(),
            limit: cap,
        });
    }
    Ok(buf)
}

/// Convenience: convert `&[&str]` into the owned argument list runners take.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Short timeout used by probes such as `is_agent_running`.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
