//! Identity resolver: the single owner of "which identity is current".
//!
//! One resolver exists per workspace. It is constructed at startup, handed to
//! command handlers by reference, and is the only code that mutates the
//! current-identity pointer.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──detect──▶ NoIdentity | Active(id)
//! NoIdentity | Active ──switch──▶ Loading ──▶ Active(new) | Error{previous}
//! ```
//!
//! # Ordering
//!
//! A switch writes git config (repository, then submodules) before touching
//! the SSH agent. If the agent step fails, git config already points at the
//! new identity; that partial state is reported, not rolled back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cancel::{CancelFlag, is_cancelled};
use crate::error::{Error, Result};
use crate::git::{ApplyReport, GitConfigAdapter, SubmoduleWalker};
use crate::identity::Identity;
use crate::process::ProcessRunner;
use crate::ssh::SshAgentAdapter;
use crate::state::{CURRENT_IDENTITY_KEY, StateStore};
use crate::store::IdentityStore;

/// Resolver state for one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolverState {
    #[default]
    Uninitialized,
    NoIdentity,
    /// A switch is in progress.
    Loading { previous: Option<Identity> },
    Active(Identity),
    /// The last switch failed; `previous` is still what is displayed.
    Error {
        message: String,
        previous: Option<Identity>,
    },
}

impl ResolverState {
    /// Identity shown to the user in this state.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            ResolverState::Active(identity) => Some(identity),
            ResolverState::Loading { previous } | ResolverState::Error { previous, .. } => {
                previous.as_ref()
            }
            ResolverState::Uninitialized | ResolverState::NoIdentity => None,
        }
    }

    fn settled(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => ResolverState::Active(identity),
            None => ResolverState::NoIdentity,
        }
    }
}

/// Where a detected identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    /// The persisted workspace pointer.
    Persisted,
    /// `user.email` of the workspace repository.
    GitConfig,
    /// A key loaded in the SSH agent.
    SshAgent,
}

/// What a successful switch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchReport {
    /// The workspace repository's local config was written.
    pub git_config_written: bool,
    /// Submodule counts, when submodules were found and updated.
    pub submodules: Option<ApplyReport>,
    /// The identity's SSH key was loaded into the agent.
    pub ssh_key_loaded: bool,
}

/// Result of [`IdentityResolver::switch_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The identity was already current; nothing was written.
    AlreadyActive,
    Switched(SwitchReport),
}

/// Orchestrates detection and switching for one workspace.
///
/// ```rust
/// use std::sync::Arc;
/// use gitpersona::settings::keys;
/// use gitpersona::{
///     IdentityResolver, IdentityStore, MemoryProvider, MemoryStateStore, SecureProcessRunner,
///     SwitchOutcome,
/// };
///
/// # tokio_test::block_on(async {
/// let provider = MemoryProvider::new().with(
///     keys::IDENTITIES,
///     serde_json::json!([{ "id": "work", "name": "Alice", "email": "alice@corp.example" }]),
/// );
/// let mut resolver = IdentityResolver::new(
///     IdentityStore::new(Arc::new(provider)),
///     Arc::new(SecureProcessRunner::new()),
///     Arc::new(MemoryStateStore::new()),
///     None,
/// );
///
/// resolver.switch_to_id("work").await.unwrap();
/// assert_eq!(resolver.current().map(|i| i.id.as_str()), Some("work"));
/// assert_eq!(resolver.switch_to_id("work").await.unwrap(), SwitchOutcome::AlreadyActive);
/// # });
/// ```
pub struct IdentityResolver {
    store: IdentityStore,
    git: GitConfigAdapter,
    submodules: SubmoduleWalker,
    ssh: SshAgentAdapter,
    state_store: Arc<dyn StateStore>,
    workspace: Option<PathBuf>,
    state: ResolverState,
}

impl IdentityResolver {
    /// Create a resolver for `workspace` (`None` when no folder is open).
    pub fn new(
        store: IdentityStore,
        runner: Arc<dyn ProcessRunner>,
        state_store: Arc<dyn StateStore>,
        workspace: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            git: GitConfigAdapter::new(Arc::clone(&runner)),
            submodules: SubmoduleWalker::new(Arc::clone(&runner)),
            ssh: SshAgentAdapter::new(runner),
            state_store,
            workspace,
            state: ResolverState::Uninitialized,
        }
    }

    /// Replace the git config adapter (e.g. to change its read scope).
    pub fn with_git_adapter(mut self, git: GitConfigAdapter) -> Self {
        self.git = git;
        self
    }

    /// Replace the SSH agent adapter (e.g. to disable keychain integration).
    pub fn with_ssh_adapter(mut self, ssh: SshAgentAdapter) -> Self {
        self.ssh = ssh;
        self
    }

    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    /// Currently displayed identity.
    pub fn current(&self) -> Option<&Identity> {
        self.state.identity()
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    pub fn ssh(&self) -> &SshAgentAdapter {
        &self.ssh
    }

    /// Detect the current identity and make it the current pointer.
    pub async fn detect_current(&mut self) -> Option<Identity> {
        self.detect_with_source(true, None)
            .await
            .map(|(identity, _)| identity)
    }

    /// Detect the current identity.
    ///
    /// Sources are tried in order: the persisted pointer (when
    /// `use_persisted`), git config, then the SSH agent. The first hit
    /// becomes current and is persisted. A cancelled flag stops before the
    /// next external call and leaves the state unchanged.
    pub async fn detect_with_source(
        &mut self,
        use_persisted: bool,
        cancel: Option<&CancelFlag>,
    ) -> Option<(Identity, DetectionSource)> {
        let identities = self.store.identities();
        if identities.is_empty() {
            self.state = ResolverState::NoIdentity;
            return None;
        }

        let found = self.find_current(&identities, use_persisted, cancel).await;
        if is_cancelled(cancel) && found.is_none() {
            return None;
        }

        match found {
            Some((identity, source)) => {
                tracing::info!(id = %identity.id, ?source, "identity detected");
                self.persist(Some(&identity.id));
                self.state = ResolverState::Active(identity.clone());
                Some((identity, source))
            }
            None => {
                tracing::info!("no identity detected");
                self.state = ResolverState::NoIdentity;
                None
            }
        }
    }

    async fn find_current(
        &self,
        identities: &[Identity],
        use_persisted: bool,
        cancel: Option<&CancelFlag>,
    ) -> Option<(Identity, DetectionSource)> {
        if use_persisted {
            if let Some(id) = self.state_store.get(CURRENT_IDENTITY_KEY) {
                match identities.iter().find(|i| i.id == id) {
                    Some(identity) => return Some((identity.clone(), DetectionSource::Persisted)),
                    None => {
                        tracing::debug!(id = %id, "persisted identity no longer configured");
                        self.persist(None);
                    }
                }
            }
        }

        if let Some(dir) = &self.workspace {
            if is_cancelled(cancel) {
                return None;
            }
            if let Some(identity) = self.git.detect(dir, identities, cancel).await {
                return Some((identity.clone(), DetectionSource::GitConfig));
            }
        }

        if is_cancelled(cancel) {
            return None;
        }
        self.ssh
            .detect(identities)
            .await
            .map(|identity| (identity.clone(), DetectionSource::SshAgent))
    }

    /// Switch to the identity with `id`.
    pub async fn switch_to_id(&mut self, id: &str) -> Result<SwitchOutcome> {
        let identity = self
            .store
            .find(id)
            .ok_or_else(|| Error::IdentityNotFound(id.to_string()))?;
        self.switch_to(&identity).await
    }

    /// Make `identity` current.
    ///
    /// Switching to the identity that is already current is a no-op. On
    /// failure the displayed identity reverts to the previous one and the
    /// error is returned unchanged; nothing is retried.
    pub async fn switch_to(&mut self, identity: &Identity) -> Result<SwitchOutcome> {
        if self.current().is_some_and(|c| c.id == identity.id) {
            tracing::info!(id = %identity.id, "identity already active");
            return Ok(SwitchOutcome::AlreadyActive);
        }

        let previous = self.current().cloned();
        self.state = ResolverState::Loading {
            previous: previous.clone(),
        };

        match self.apply(identity).await {
            Ok(report) => {
                tracing::info!(id = %identity.id, ?report, "switched identity");
                self.persist(Some(&identity.id));
                self.state = ResolverState::Active(identity.clone());
                Ok(SwitchOutcome::Switched(report))
            }
            Err(e) => {
                tracing::error!(id = %identity.id, error = %e, "identity switch failed");
                self.state = ResolverState::Error {
                    message: e.to_string(),
                    previous,
                };
                Err(e)
            }
        }
    }

    /// Returns the state to a settled form after an error was shown.
    pub fn acknowledge_error(&mut self) {
        if let ResolverState::Error { previous, .. } = &self.state {
            self.state = ResolverState::settled(previous.clone());
        }
    }

    async fn apply(&self, identity: &Identity) -> Result<SwitchReport> {
        identity.validate()?;
        let settings = self.store.settings();
        let effective = if settings.include_icon_in_git_config {
            identity.clone()
        } else {
            identity.without_icon()
        };

        let mut report = SwitchReport::default();
        if let Some(dir) = &self.workspace {
            if self.git.is_repository(dir).await {
                self.git.write_identity(dir, &effective).await?;
                report.git_config_written = true;

                if settings.apply_to_submodules {
                    let submodules = self
                        .submodules
                        .list_recursive(dir, settings.submodule_depth)
                        .await;
                    if !submodules.is_empty() {
                        let applied = self
                            .submodules
                            .apply_identity(
                                &submodules,
                                &effective.git_user_name(),
                                &effective.email,
                                effective.gpg_key_id.as_deref(),
                            )
                            .await;
                        if applied.failed > 0 {
                            tracing::warn!(
                                success = applied.success,
                                failed = applied.failed,
                                "identity applied to some submodules only"
                            );
                        }
                        report.submodules = Some(applied);
                    }
                }
            } else {
                tracing::debug!(dir = %dir.display(), "workspace is not a repository, skipping git config");
            }
        }

        if settings.auto_switch_ssh_key && identity.ssh_key_path.is_some() {
            let all = self.store.identities();
            report.ssh_key_loaded = self.ssh.switch_to_identity_key(identity, &all).await?;
        }
        Ok(report)
    }

    fn persist(&self, id: Option<&str>) {
        if let Err(e) = self.state_store.set(CURRENT_IDENTITY_KEY, id) {
            tracing::warn!(error = %e, "could not persist current identity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::RunOptions;
    use crate::process::ProcessOutput;
    use crate::settings::{MemoryProvider, keys};
    use crate::state::MemoryStateStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Runner that fails every call and records what was attempted.
    #[derive(Default)]
    struct NoProcessRunner {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProcessRunner for NoProcessRunner {
        async fn run(
            &self,
            command: &str,
            args: &[String],
            _options: &RunOptions,
        ) -> Result<ProcessOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{command} {}", args.join(" ")));
            Err(Error::execution_failure(command, Some(1), "unavailable"))
        }
    }

    fn resolver(identities: serde_json::Value) -> (IdentityResolver, Arc<NoProcessRunner>, Arc<MemoryStateStore>) {
        let provider = MemoryProvider::new().with(keys::IDENTITIES, identities);
        let store = IdentityStore::new(Arc::new(provider));
        let runner = Arc::new(NoProcessRunner::default());
        let state = Arc::new(MemoryStateStore::new());
        let resolver = IdentityResolver::new(store, runner.clone(), state.clone(), None);
        (resolver, runner, state)
    }

    #[test]
    fn test_state_identity() {
        let a = Identity::new("a", "A", "a@x.com");
        assert_eq!(ResolverState::Uninitialized.identity(), None);
        assert_eq!(ResolverState::Active(a.clone()).identity(), Some(&a));
        let err = ResolverState::Error {
            message: "boom".into(),
            previous: Some(a.clone()),
        };
        assert_eq!(err.identity(), Some(&a));
        assert_eq!(ResolverState::settled(None), ResolverState::NoIdentity);
    }

    #[tokio::test]
    async fn test_detect_with_no_identities() {
        let (mut resolver, runner, _) = resolver(json!([]));
        assert_eq!(resolver.detect_current().await, None);
        assert_eq!(resolver.state(), &ResolverState::NoIdentity);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detect_prefers_persisted_pointer() {
        let (mut resolver, runner, state) = resolver(json!([
            {"id": "a", "name": "A", "email": "a@x.com"},
            {"id": "b", "name": "B", "email": "b@x.com"}
        ]));
        state.set(CURRENT_IDENTITY_KEY, Some("b")).unwrap();
        let (identity, source) = resolver.detect_with_source(true, None).await.unwrap();
        assert_eq!(identity.id, "b");
        assert_eq!(source, DetectionSource::Persisted);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_pointer_is_cleared() {
        let (mut resolver, _, state) = resolver(json!([
            {"id": "a", "name": "A", "email": "a@x.com"}
        ]));
        state.set(CURRENT_IDENTITY_KEY, Some("gone")).unwrap();
        assert_eq!(resolver.detect_current().await, None);
        assert_eq!(state.get(CURRENT_IDENTITY_KEY), None);
    }

    #[tokio::test]
    async fn test_cancelled_detection_spawns_nothing() {
        let (mut resolver, runner, _) = resolver(json!([
            {"id": "a", "name": "A", "email": "a@x.com", "sshKeyPath": "/k/id_a"}
        ]));
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert_eq!(resolver.detect_with_source(true, Some(&cancel)).await, None);
        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(resolver.state(), &ResolverState::Uninitialized);
    }

    #[tokio::test]
    async fn test_switch_without_workspace_or_keys() {
        let (mut resolver, runner, state) = resolver(json!([
            {"id": "a", "name": "A", "email": "a@x.com"}
        ]));
        let a = resolver.store().find("a").unwrap();
        let outcome = resolver.switch_to(&a).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched(SwitchReport::default()));
        assert_eq!(resolver.current(), Some(&a));
        assert_eq!(state.get(CURRENT_IDENTITY_KEY).as_deref(), Some("a"));
        assert!(runner.calls.lock().unwrap().is_empty());

        // Second switch to the same identity is a no-op
        assert_eq!(
            resolver.switch_to(&a).await.unwrap(),
            SwitchOutcome::AlreadyActive
        );
    }

    #[tokio::test]
    async fn test_failed_switch_reverts_to_previous() {
        let (mut resolver, _, state) = resolver(json!([
            {"id": "a", "name": "A", "email": "a@x.com"},
            {"id": "b", "name": "B", "email": "b@x.com", "sshKeyPath": "/k/id_b"}
        ]));
        resolver.switch_to_id("a").await.unwrap();

        // ssh-add fails in NoProcessRunner, so switching to b fails
        let err = resolver.switch_to_id("b").await.unwrap_err();
        assert!(matches!(err, Error::ExecutionFailure { .. }));
        assert_eq!(resolver.current().unwrap().id, "a");
        assert!(matches!(resolver.state(), ResolverState::Error { .. }));
        assert_eq!(state.get(CURRENT_IDENTITY_KEY).as_deref(), Some("a"));

        resolver.acknowledge_error();
        assert_eq!(resolver.state(), &ResolverState::Active(resolver.store().find("a").unwrap()));
    }

    #[tokio::test]
    async fn test_switch_to_unknown_id() {
        let (mut resolver, _, _) = resolver(json!([]));
        assert!(matches!(
            resolver.switch_to_id("nope").await,
            Err(Error::IdentityNotFound(_))
        ));
        assert_eq!(resolver.state(), &ResolverState::Uninitialized);
    }

    #[tokio::test]
    async fn test_switch_rejects_invalid_identity() {
        let (mut resolver, runner, _) = resolver(json!([]));
        let bogus = Identity::new("x", "--global", "x@x.com");
        assert!(matches!(
            resolver.switch_to(&bogus).await,
            Err(Error::InvalidIdentity(_))
        ));
        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(resolver.current(), None);
    }
}
