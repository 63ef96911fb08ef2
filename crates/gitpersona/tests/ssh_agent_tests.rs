//! SSH Agent Tests
//!
//! Exercises the agent adapter against an in-process fake agent that mimics
//! `ssh-add` exit codes.

mod common;

use gitpersona::{Error, Identity, SshAgentAdapter};
use std::sync::Arc;

use common::FakeAgent;

fn identities() -> Vec<Identity> {
    vec![
        Identity::new("work", "Alice", "alice@corp.example").with_ssh_key("/keys/id_work"),
        Identity::new("oss", "Alice", "alice@oss.example").with_ssh_key("/keys/id_oss"),
        Identity::new("alias", "Alice", "alice@alias.example").with_ssh_key("/keys/id_oss"),
        Identity::new("plain", "Alice", "alice@plain.example"),
    ]
}

fn adapter(agent: &Arc<FakeAgent>) -> SshAgentAdapter {
    SshAgentAdapter::new(agent.clone()).with_keychain(false)
}

mod listing {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_empty_agent() {
        let agent = Arc::new(FakeAgent::new());
        let ssh = adapter(&agent);
        assert!(ssh.list_keys().await.is_empty());
        assert!(ssh.is_agent_running().await, "exit code 1 means reachable");
    }

    #[tokio::test]
    async fn test_stopped_agent() {
        let agent = Arc::new(FakeAgent::stopped());
        let ssh = adapter(&agent);
        assert!(ssh.list_keys().await.is_empty());
        assert!(!ssh.is_agent_running().await);
        assert!(ssh.detect(&identities()).await.is_none());
    }

    #[tokio::test]
    async fn test_list_and_detect() {
        let agent = Arc::new(FakeAgent::new().with_loaded("/keys/id_oss"));
        let ssh = adapter(&agent);
        let keys = ssh.list_keys().await;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].comment, "/keys/id_oss");
        assert_eq!(keys[0].key_type, "ED25519");

        let ids = identities();
        assert_eq!(ssh.detect(&ids).await.unwrap().id, "oss", "first match wins");
    }

    #[tokio::test]
    async fn test_fingerprint() {
        let agent = Arc::new(FakeAgent::new());
        let ssh = adapter(&agent);
        assert_eq!(ssh.fingerprint("/keys/id_work").await.as_deref(), Some("SHA256:keygen"));
        assert_eq!(ssh.fingerprint("-oProxyCommand=x").await, None);
    }
}

mod switching {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_only_target_key_remains() {
        let agent = Arc::new(
            FakeAgent::new()
                .with_loaded("/keys/id_work")
                .with_loaded("/elsewhere/deploy_key"),
        );
        let ssh = adapter(&agent);
        let ids = identities();

        assert!(ssh.switch_to_identity_key(&ids[1], &ids).await.unwrap());
        assert_eq!(
            agent.loaded(),
            vec!["/elsewhere/deploy_key".to_string(), "/keys/id_oss".to_string()],
            "keys of unconfigured identities are left alone"
        );

        assert!(ssh.switch_to_identity_key(&ids[0], &ids).await.unwrap());
        assert_eq!(
            agent.loaded(),
            vec!["/elsewhere/deploy_key".to_string(), "/keys/id_work".to_string()]
        );
    }

    #[tokio::test]
    async fn test_identity_without_key_is_noop() {
        let agent = Arc::new(FakeAgent::new().with_loaded("/keys/id_work"));
        let ssh = adapter(&agent);
        let ids = identities();
        assert!(!ssh.switch_to_identity_key(&ids[3], &ids).await.unwrap());
        assert_eq!(agent.loaded(), vec!["/keys/id_work".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_missing_key_succeeds() {
        let agent = Arc::new(FakeAgent::new());
        adapter(&agent).remove_key("/keys/id_work").await.unwrap();
    }

    #[tokio::test]
    async fn test_add_fails_without_agent() {
        let agent = Arc::new(FakeAgent::stopped());
        let ids = identities();
        let err = adapter(&agent)
            .switch_to_identity_key(&ids[0], &ids)
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::ExecutionFailure { code: Some(2), .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_keychain_flag() {
        let agent = Arc::new(FakeAgent::new());
        SshAgentAdapter::new(agent.clone())
            .with_keychain(true)
            .add_key("/keys/id_work")
            .await
            .unwrap();
        assert_eq!(agent.loaded(), vec!["/keys/id_work".to_string()]);
    }

    #[tokio::test]
    async fn test_unsafe_path_rejected_before_spawn() {
        let agent = Arc::new(FakeAgent::new());
        let err = adapter(&agent).add_key("-D").await.unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(_)));
        assert!(agent.loaded().is_empty());
    }
}
