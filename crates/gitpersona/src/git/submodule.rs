//! Submodule discovery and identity propagation.

use futures_util::future::{BoxFuture, FutureExt, join_all};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::{COMMIT_GPG_SIGN, GitConfigAdapter, USER_EMAIL, USER_NAME, USER_SIGNING_KEY};
use crate::error::{Error, Result};
use crate::limits::RunOptions;
use crate::process::{GIT, ProcessRunner, args};

/// One row of `git submodule status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    /// Path relative to the superproject.
    pub path: String,
    pub absolute_path: PathBuf,
    pub commit_hash: String,
    pub initialized: bool,
}

/// Outcome of applying an identity to a batch of submodules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub success: usize,
    pub failed: usize,
}

impl ApplyReport {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// `Err(PartialSubmoduleFailure)` when any submodule failed.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.failed == 0 {
            Ok(())
        } else {
            Err(Error::PartialSubmoduleFailure {
                failed: self.failed,
                total: self.total(),
            })
        }
    }
}

/// Walks initialized submodules and writes identity config into them.
#[derive(Clone)]
pub struct SubmoduleWalker {
    runner: Arc<dyn ProcessRunner>,
    git: GitConfigAdapter,
}

impl SubmoduleWalker {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            git: GitConfigAdapter::new(Arc::clone(&runner)),
            runner,
        }
    }

    /// Initialized direct submodules of `root`.
    ///
    /// Not a repository, no submodules, or any git failure: empty list.
    pub async fn list(&self, root: &Path) -> Vec<Submodule> {
        match self
            .runner
            .run(GIT, &args(["submodule", "status"]), &RunOptions::in_dir(root))
            .await
        {
            Ok(out) => parse_status(&out.stdout, root)
                .into_iter()
                .filter(|s| s.initialized)
                .collect(),
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "submodule status failed");
                Vec::new()
            }
        }
    }

    /// Initialized submodules below `root`, `max_depth` levels deep.
    ///
    /// `max_depth = 1` returns only the direct submodules of `root`;
    /// `max_depth = 0` returns nothing.
    pub async fn list_recursive(&self, root: &Path, max_depth: usize) -> Vec<Submodule> {
        self.collect(root.to_path_buf(), 0, max_depth).await
    }

    fn collect(&self, dir: PathBuf, depth: usize, max_depth: usize) -> BoxFuture<'_, Vec<Submodule>> {
        async move {
            if depth >= max_depth {
                return Vec::new();
            }
            let mut found = Vec::new();
            for submodule in self.list(&dir).await {
                let nested_root = submodule.absolute_path.clone();
                found.push(submodule);
                found.extend(self.collect(nested_root, depth + 1, max_depth).await);
            }
            found
        }
        .boxed()
    }

    /// Write name, email and optional signing config into every submodule.
    ///
    /// Submodules are processed concurrently; within one submodule the
    /// writes are ordered and stop at the first failure. One failing
    /// submodule never aborts the others.
    pub async fn apply_identity(
        &self,
        submodules: &[Submodule],
        name: &str,
        email: &str,
        gpg_key_id: Option<&str>,
    ) -> ApplyReport {
        let results = join_all(
            submodules
                .iter()
                .map(|s| self.apply_one(&s.absolute_path, name, email, gpg_key_id)),
        )
        .await;

        let mut report = ApplyReport::default();
        for (submodule, result) in submodules.iter().zip(results) {
            match result {
                Ok(()) => report.success += 1,
                Err(e) => {
                    tracing::warn!(submodule = %submodule.path, error = %e, "failed to update submodule");
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn apply_one(
        &self,
        dir: &Path,
        name: &str,
        email: &str,
        gpg_key_id: Option<&str>,
    ) -> Result<()> {
        self.git.set(dir, USER_NAME, name).await?;
        self.git.set(dir, USER_EMAIL, email).await?;
        if let Some(key) = gpg_key_id {
            self.git.set(dir, USER_SIGNING_KEY, key).await?;
            self.git.set(dir, COMMIT_GPG_SIGN, "true").await?;
        }
        Ok(())
    }
}

/// Parse `git submodule status` output.
///
/// Line format: `<state><sha1> <path>[ (<describe>)]` where state is
/// `' '` (checked out), `'-'` (not initialized), `'+'` (checked-out commit
/// differs from the recorded one) or `'U'` (merge conflict).
pub fn parse_status(output: &str, root: &Path) -> Vec<Submodule> {
    output
        .lines()
        .filter_map(|line| parse_status_line(line, root))
        .collect()
}

fn parse_status_line(line: &str, root: &Path) -> Option<Submodule> {
    let mut chars = line.chars();
    let state = chars.next()?;
    let rest = chars.as_str();
    let (hash, rest) = rest.split_once(' ')?;
    if hash.is_empty() {
        return None;
    }
    let initialized = state != '-';
    let path = strip_describe(rest.trim(), initialized, root);
    if path.is_empty() {
        return None;
    }
    Some(Submodule {
        path: path.to_string(),
        absolute_path: root.join(path),
        commit_hash: hash.to_string(),
        initialized,
    })
}

/// Drop the trailing `(describe)` from an initialized row.
///
/// Uninitialized rows never carry one. A checked-out row may lack it when
/// `git describe` finds nothing, so a path that itself ends in `" (...)"` is
/// kept whole when that directory exists and the shortened one does not.
fn strip_describe<'a>(rest: &'a str, initialized: bool, root: &Path) -> &'a str {
    if !initialized || !rest.ends_with(')') {
        return rest;
    }
    let Some(idx) = rest.rfind(" (") else {
        return rest;
    };
    let short = rest[..idx].trim_end();
    if !root.join(short).exists() && root.join(rest).is_dir() {
        return rest;
    }
    short
}
