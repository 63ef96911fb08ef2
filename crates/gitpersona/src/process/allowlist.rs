//! Command allowlist for external process execution
//!
//! Every invocation is matched against a fixed set of `(command, argument
//! shape)` pairs. Anything not listed here is rejected before a process is
//! spawned.

use std::collections::HashSet;

/// The git binary.
pub const GIT: &str = "git";
/// The ssh-add binary.
pub const SSH_ADD: &str = "ssh-add";
/// The ssh-keygen binary.
pub const SSH_KEYGEN: &str = "ssh-keygen";

/// macOS flag that stores the passphrase in the login keychain.
pub const APPLE_KEYCHAIN_FLAG: &str = "--apple-use-keychain";

/// Git config keys the switcher may read or write.
pub const ALLOWED_CONFIG_KEYS: [&str; 4] = [
    "user.name",
    "user.email",
    "user.signingkey",
    "commit.gpgsign",
];

/// Command allowlist.
///
/// Permitted invocations:
///
/// - `git config [--local] <key>`
/// - `git config --local <key> <value>`
/// - `git config --local --unset <key>`
/// - `git rev-parse --is-inside-work-tree`
/// - `git submodule status`
/// - `ssh-add -l`
/// - `ssh-add [--apple-use-keychain] <path>`
/// - `ssh-add -d <path>`
/// - `ssh-keygen -lf <path>`
#[derive(Debug, Clone)]
pub struct CommandAllowlist {
    config_keys: HashSet<&'static str>,
}

/// Result of matching an invocation against the allowlist
#[derive(Debug, Clone, PartialEq)]
pub enum CommandMatch {
    /// Invocation is allowed
    Allowed,
    /// Invocation is blocked
    Blocked { reason: String },
}

impl CommandMatch {
    fn blocked(reason: impl Into<String>) -> Self {
        CommandMatch::Blocked {
            reason: reason.into(),
        }
    }

    /// Whether the invocation may run.
    pub fn is_allowed(&self) -> bool {
        matches!(self, CommandMatch::Allowed)
    }
}

impl Default for CommandAllowlist {
    fn default() -> Self {
        Self {
            config_keys: ALLOWED_CONFIG_KEYS.into_iter().collect(),
        }
    }
}

impl CommandAllowlist {
    /// Create the standard allowlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `command args...` may be executed.
    pub fn check(&self, command: &str, args: &[String]) -> CommandMatch {
        if args
            .iter()
            .any(|a| a.contains('\0') || a.contains('\n') || a.contains('\r'))
        {
            return CommandMatch::blocked("argument contains a NUL or line break");
        }

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match command {
            GIT => self.check_git(&args),
            SSH_ADD => check_ssh_add(&args),
            SSH_KEYGEN => check_ssh_keygen(&args),
            other => CommandMatch::blocked(format!("command not allowed: {other}")),
        }
    }

    fn check_git(&self, args: &[&str]) -> CommandMatch {
        match args {
            ["rev-parse", "--is-inside-work-tree"] | ["submodule", "status"] => {
                CommandMatch::Allowed
            }
            ["config", "--local", "--unset", key] => self.check_config_key(key),
            ["config", key] | ["config", "--local", key] => self.check_config_key(key),
            ["config", "--local", key, value] => match self.check_config_key(key) {
                CommandMatch::Allowed if value.starts_with('-') => {
                    CommandMatch::blocked("config value must not start with '-'")
                }
                other => other,
            },
            ["config", ..] => CommandMatch::blocked("unsupported git config invocation"),
            ["rev-parse", ..] | ["submodule", ..] => {
                CommandMatch::blocked("unsupported arguments for git subcommand")
            }
            [sub, ..] => CommandMatch::blocked(format!("git subcommand not allowed: {sub}")),
            [] => CommandMatch::blocked("missing git subcommand"),
        }
    }

    fn check_config_key(&self, key: &str) -> CommandMatch {
        if self.config_keys.contains(key) {
            CommandMatch::Allowed
        } else {
            CommandMatch::blocked(format!("git config key not allowed: {key}"))
        }
    }
}

fn check_ssh_add(args: &[&str]) -> CommandMatch {
    match args {
        ["-l"] => CommandMatch::Allowed,
        ["-d", path] | [APPLE_KEYCHAIN_FLAG, path] => check_key_path(path),
        [path] if !path.starts_with('-') => check_key_path(path),
        _ => CommandMatch::blocked("unsupported ssh-add invocation"),
    }
}

fn check_ssh_keygen(args: &[&str]) -> CommandMatch {
    match args {
        ["-lf", path] => check_key_path(path),
        _ => CommandMatch::blocked("unsupported ssh-keygen invocation"),
    }
}

fn check_key_path(path: &str) -> CommandMatch {
    if path.is_empty() {
        CommandMatch::blocked("empty key path")
    } else if path.starts_with('-') {
        CommandMatch::blocked("key path must not start with '-'")
    } else {
        CommandMatch::Allowed
    }
}
