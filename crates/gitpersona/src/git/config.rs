//! Git config adapter.
//!
//! Reads and writes the identity keys of one working directory. Every call
//! is resolved against an explicit directory and goes through the
//! [`ProcessRunner`].
//!
//! # Scope
//!
//! Writes always use `--local`; global and system config are never touched.
//! Reads default to the effective value (what `git commit` would use) and can
//! be narrowed to the local file with [`ReadScope::Local`].

use std::path::Path;
use std::sync::Arc;

use crate::cancel::{CancelFlag, is_cancelled};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::limits::RunOptions;
use crate::process::{GIT, ProcessRunner, args};

pub const USER_NAME: &str = "user.name";
pub const USER_EMAIL: &str = "user.email";
pub const USER_SIGNING_KEY: &str = "user.signingkey";
pub const COMMIT_GPG_SIGN: &str = "commit.gpgsign";

/// Snapshot of the identity keys for one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitConfig {
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub signing_key: Option<String>,
}

/// Which config files a read consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadScope {
    /// Effective value across system, global and local config.
    #[default]
    Effective,
    /// Only the repository's `.git/config`.
    Local,
}

/// Reads and writes git identity config.
#[derive(Clone)]
pub struct GitConfigAdapter {
    runner: Arc<dyn ProcessRunner>,
    read_scope: ReadScope,
}

impl GitConfigAdapter {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            read_scope: ReadScope::default(),
        }
    }

    /// Narrow or widen the scope used by reads.
    pub fn with_read_scope(mut self, scope: ReadScope) -> Self {
        self.read_scope = scope;
        self
    }

    /// True iff `dir` is inside a git working tree. Never fails.
    pub async fn is_repository(&self, dir: &Path) -> bool {
        match self
            .runner
            .run(
                GIT,
                &args(["rev-parse", "--is-inside-work-tree"]),
                &RunOptions::in_dir(dir),
            )
            .await
        {
            Ok(out) => out.stdout.trim() == "true",
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "not a repository");
                false
            }
        }
    }

    /// Read `user.name`, `user.email` and `user.signingkey` concurrently.
    ///
    /// Unset keys (and any read failure) map to `None`. With an already
    /// cancelled flag this returns an empty snapshot without spawning.
    pub async fn read_config(&self, dir: &Path, cancel: Option<&CancelFlag>) -> GitConfig {
        if is_cancelled(cancel) {
            return GitConfig::default();
        }
        let (user_name, user_email, signing_key) = tokio::join!(
            self.get(dir, USER_NAME, cancel),
            self.get(dir, USER_EMAIL, cancel),
            self.get(dir, USER_SIGNING_KEY, cancel),
        );
        GitConfig {
            user_name,
            user_email,
            signing_key,
        }
    }

    /// Read a single key; `None` when unset, unreadable or cancelled.
    pub async fn get(&self, dir: &Path, key: &str, cancel: Option<&CancelFlag>) -> Option<String> {
        if is_cancelled(cancel) {
            return None;
        }
        let argv = match self.read_scope {
            ReadScope::Effective => args(["config", key]),
            ReadScope::Local => args(["config", "--local", key]),
        };
        match self.runner.run(GIT, &argv, &RunOptions::in_dir(dir)).await {
            Ok(out) => {
                let value = out.stdout.trim_end_matches(['\n', '\r']);
                (!value.is_empty()).then(|| value.to_string())
            }
            Err(Error::ExecutionFailure { .. }) => None,
            Err(e) => {
                tracing::debug!(key, error = %e, "git config read failed");
                None
            }
        }
    }

    /// Write `identity` into the repository's local config.
    ///
    /// `user.name` gets the icon-prefixed form when the identity has an icon.
    /// Signing config is only written, never cleared: an identity without a
    /// GPG key leaves `user.signingkey` and `commit.gpgsign` untouched.
    pub async fn write_identity(&self, dir: &Path, identity: &Identity) -> Result<()> {
        if !self.is_repository(dir).await {
            return Err(Error::NotARepository(dir.to_path_buf()));
        }
        self.set(dir, USER_NAME, &identity.git_user_name()).await?;
        self.set(dir, USER_EMAIL, &identity.email).await?;
        if let Some(key) = &identity.gpg_key_id {
            self.set(dir, USER_SIGNING_KEY, key).await?;
            self.set(dir, COMMIT_GPG_SIGN, "true").await?;
        }
        tracing::debug!(dir = %dir.display(), id = %identity.id, "git config written");
        Ok(())
    }

    /// `git config --local <key> <value>`.
    pub async fn set(&self, dir: &Path, key: &str, value: &str) -> Result<()> {
        self.runner
            .run(
                GIT,
                &args(["config", "--local", key, value]),
                &RunOptions::in_dir(dir),
            )
            .await
            .map(drop)
    }

    /// `git config --local --unset <key>`. Unsetting a missing key is a no-op.
    pub async fn unset(&self, dir: &Path, key: &str) -> Result<()> {
        match self
            .runner
            .run(
                GIT,
                &args(["config", "--local", "--unset", key]),
                &RunOptions::in_dir(dir),
            )
            .await
        {
            Ok(_) => Ok(()),
            // git exits with 5 when the key does not exist
            Err(Error::ExecutionFailure { code: Some(5), .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// The identity whose email equals the current `user.email`.
    ///
    /// With duplicate emails the first identity in list order wins.
    pub async fn detect<'a>(
        &self,
        dir: &Path,
        identities: &'a [Identity],
        cancel: Option<&CancelFlag>,
    ) -> Option<&'a Identity> {
        if identities.is_empty() {
            return None;
        }
        let email = self.get(dir, USER_EMAIL, cancel).await?;
        match_email(identities, &email)
    }
}

/// First identity whose email equals `email` exactly.
pub fn match_email<'a>(identities: &'a [Identity], email: &str) -> Option<&'a Identity> {
    identities.iter().find(|i| i.email == email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_email_first_wins() {
        let ids = vec![
            Identity::new("a", "A", "same@x.com"),
            Identity::new("b", "B", "same@x.com"),
            Identity::new("c", "C", "c@x.com"),
        ];
        assert_eq!(match_email(&ids, "same@x.com").unwrap().id, "a");
        assert_eq!(match_email(&ids, "c@x.com").unwrap().id, "c");
        // Exact match only
        assert!(match_email(&ids, "C@x.com").is_none());
        assert!(match_email(&ids, "").is_none());
    }
}
