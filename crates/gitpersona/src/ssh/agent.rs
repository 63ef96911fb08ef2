//! SSH agent adapter.
//!
//! Keeps at most one configured identity's key loaded in the agent and maps
//! loaded keys back to identities.
//!
//! Mapping is a filename heuristic: an identity matches when the file name
//! of its key path appears in the comment of a loaded key. Two key files
//! with the same file name are indistinguishable.

use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use crate::error::{Error, Result};
use crate::identity::{Identity, expand_home, key_file_name, validate_key_path};
use crate::limits::RunOptions;
use crate::logging_impl::audit;
use crate::process::{APPLE_KEYCHAIN_FLAG, PROBE_TIMEOUT, ProcessRunner, SSH_ADD, SSH_KEYGEN, args};

/// `<bits> <fingerprint> <comment> (<type>)`
static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(\S+)\s+(.*?)\s*\(([^()]+)\)$").expect("key line regex must compile")
});

/// A key reported by `ssh-add -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentKey {
    pub bits: Option<u32>,
    pub fingerprint: String,
    pub comment: String,
    pub key_type: String,
}

/// Lists, adds and removes agent keys.
#[derive(Clone)]
pub struct SshAgentAdapter {
    runner: Arc<dyn ProcessRunner>,
    use_keychain: bool,
}

impl SshAgentAdapter {
    /// Uses the macOS keychain flag when built for macOS.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            use_keychain: cfg!(target_os = "macos"),
        }
    }

    /// Force keychain integration on or off.
    pub fn with_keychain(mut self, enabled: bool) -> Self {
        self.use_keychain = enabled;
        self
    }

    /// Keys currently loaded in the agent.
    ///
    /// "No keys" and "no agent" both yield an empty list.
    pub async fn list_keys(&self) -> Vec<AgentKey> {
        match self
            .runner
            .run(SSH_ADD, &args(["-l"]), &RunOptions::default())
            .await
        {
            Ok(out) => parse_key_list(&out.stdout),
            Err(e) => {
                tracing::debug!(error = %e, "ssh-add -l returned no keys");
                Vec::new()
            }
        }
    }

    /// Whether an agent is reachable. `ssh-add -l` exits 1 for an empty
    /// agent and 2 when it cannot connect.
    pub async fn is_agent_running(&self) -> bool {
        match self
            .runner
            .run(
                SSH_ADD,
                &args(["-l"]),
                &RunOptions::default().timeout(PROBE_TIMEOUT),
            )
            .await
        {
            Ok(_) => true,
            Err(Error::ExecutionFailure { code: Some(1), .. }) => true,
            Err(_) => false,
        }
    }

    /// Load the key at `path` (a leading `~` is expanded).
    pub async fn add_key(&self, path: &str) -> Result<()> {
        let expanded = checked_path(path)?;
        let argv = if self.use_keychain {
            args([APPLE_KEYCHAIN_FLAG.to_string(), expanded])
        } else {
            args([expanded])
        };
        self.runner
            .run(SSH_ADD, &argv, &RunOptions::default())
            .await?;
        tracing::info!(key = %key_file_name(path).unwrap_or_default(), "ssh key added to agent");
        Ok(())
    }

    /// Unload the key at `path`. Removing a key that is not loaded succeeds.
    pub async fn remove_key(&self, path: &str) -> Result<()> {
        let expanded = checked_path(path)?;
        match self
            .runner
            .run(SSH_ADD, &args(["-d".to_string(), expanded]), &RunOptions::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::ExecutionFailure { .. }) => {
                tracing::debug!(key = %key_file_name(path).unwrap_or_default(), "key was not loaded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Make `identity`'s key the only configured key in the agent.
    ///
    /// Removes the key of every identity in `all` (failures are logged and
    /// ignored), then adds the target key. Returns `false` when the identity
    /// has no key configured, in which case nothing is touched.
    pub async fn switch_to_identity_key(&self, identity: &Identity, all: &[Identity]) -> Result<bool> {
        let Some(target) = identity.ssh_key_path.as_deref() else {
            return Ok(false);
        };

        let mut seen = HashSet::new();
        for other in all {
            let (Some(path), Some(expanded)) =
                (other.ssh_key_path.as_deref(), other.expanded_ssh_key_path())
            else {
                continue;
            };
            if !seen.insert(expanded) {
                continue;
            }
            if let Err(e) = self.remove_key(path).await {
                tracing::warn!(id = %other.id, error = %e, "could not remove ssh key");
            }
        }

        self.add_key(target).await?;
        Ok(true)
    }

    /// First identity (in list order) whose key file name appears in the
    /// comment of a loaded key.
    pub async fn detect<'a>(&self, identities: &'a [Identity]) -> Option<&'a Identity> {
        if !identities.iter().any(|i| i.ssh_key_path.is_some()) {
            return None;
        }
        let keys = self.list_keys().await;
        match_loaded_key(identities, &keys)
    }

    /// `ssh-keygen -lf <path>` fingerprint, if the key can be read.
    pub async fn fingerprint(&self, path: &str) -> Option<String> {
        let expanded = checked_path(path).ok()?;
        let out = self
            .runner
            .run(SSH_KEYGEN, &args(["-lf".to_string(), expanded]), &RunOptions::default())
            .await
            .ok()?;
        out.stdout
            .split_whitespace()
            .nth(1)
            .map(str::to_string)
    }
}

/// Identity matching a loaded key by file name.
pub fn match_loaded_key<'a>(identities: &'a [Identity], keys: &[AgentKey]) -> Option<&'a Identity> {
    identities.iter().find(|identity| {
        let Some(name) = identity.ssh_key_path.as_deref().and_then(key_file_name) else {
            return false;
        };
        !name.is_empty() && keys.iter().any(|k| k.comment.contains(&name))
    })
}

/// Parse `ssh-add -l` output.
///
/// Lines look like `256 SHA256:abc... alice@laptop (ED25519)`. Lines that do
/// not match still produce a record, with the whole line as comment.
pub fn parse_key_list(output: &str) -> Vec<AgentKey> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            match KEY_LINE.captures(line) {
                Some(c) => AgentKey {
                    bits: c[1].parse().ok(),
                    fingerprint: c[2].to_string(),
                    comment: c[3].to_string(),
                    key_type: c[4].to_string(),
                },
                None => AgentKey {
                    bits: None,
                    fingerprint: String::new(),
                    comment: line.to_string(),
                    key_type: "unknown".to_string(),
                },
            }
        })
        .collect()
}

/// Validate and expand a key path for `ssh-add`/`ssh-keygen`.
fn checked_path(path: &str) -> Result<String> {
    if let Err(reason) = validate_key_path(path) {
        audit::security_event("unsafe_key_path", &reason);
        return Err(Error::InvalidIdentity(reason));
    }
    Ok(expand_home(path).to_string_lossy().into_owned())
}
