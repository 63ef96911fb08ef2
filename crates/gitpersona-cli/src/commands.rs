//! Command handlers.

use anyhow::{Context, Result};

use gitpersona::{DetectionSource, Identity, IdentityResolver, SwitchOutcome};

/// Prints success lines unless notifications are turned off. Warnings always
/// go to stderr.
pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn success(&self, message: &str) {
        if self.enabled {
            println!("{message}");
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }
}

pub async fn list(resolver: &mut IdentityResolver) -> Result<()> {
    let identities = resolver.store().identities();
    if identities.is_empty() {
        println!("No identities configured");
        return Ok(());
    }
    let current = resolver.detect_current().await.map(|i| i.id);
    for identity in &identities {
        let marker = if current.as_deref() == Some(identity.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<16} {}", identity.id, describe(identity));
    }
    Ok(())
}

pub async fn show(resolver: &mut IdentityResolver, use_persisted: bool) -> Result<()> {
    match resolver.detect_with_source(use_persisted, None).await {
        Some((identity, source)) => {
            println!("{} {} ({})", identity.id, identity.label(), source_name(source));
        }
        None => println!("none"),
    }
    Ok(())
}

pub async fn switch(resolver: &mut IdentityResolver, id: &str, notify: &Notifier) -> Result<()> {
    resolver.detect_current().await;
    let outcome = resolver
        .switch_to_id(id)
        .await
        .with_context(|| format!("Failed to switch to identity '{id}'"))?;

    match outcome {
        SwitchOutcome::AlreadyActive => notify.success(&format!("{id} is already active")),
        SwitchOutcome::Switched(report) => {
            if let Some(submodules) = report.submodules {
                if submodules.failed > 0 {
                    notify.warn(&format!(
                        "identity applied to {} of {} submodules",
                        submodules.success,
                        submodules.total()
                    ));
                } else {
                    notify.success(&format!("Updated {} submodules", submodules.success));
                }
            }
            if !report.git_config_written {
                notify.warn("workspace is not a git repository, git config unchanged");
            }
            if report.ssh_key_loaded {
                notify.success("SSH key loaded");
            }
            notify.success(&format!("Switched to {id}"));
        }
    }
    Ok(())
}

pub async fn keys(resolver: &IdentityResolver) -> Result<()> {
    let ssh = resolver.ssh();
    if !ssh.is_agent_running().await {
        anyhow::bail!("No SSH agent is reachable");
    }
    let keys = ssh.list_keys().await;
    if keys.is_empty() {
        println!("The agent has no identities");
    }
    for key in keys {
        let bits = key.bits.map(|b| b.to_string()).unwrap_or_default();
        println!("{bits:>5} {} {} ({})", key.fingerprint, key.comment, key.key_type);
    }
    Ok(())
}

fn describe(identity: &Identity) -> String {
    let mut line = identity.label();
    if let Some(description) = &identity.description {
        line.push_str(&format!(" - {description}"));
    }
    if let Some(key) = identity
        .ssh_key_path
        .as_deref()
        .and_then(gitpersona::key_file_name)
    {
        line.push_str(&format!(" [ssh: {key}]"));
    }
    line
}

fn source_name(source: DetectionSource) -> &'static str {
    match source {
        DetectionSource::Persisted => "saved",
        DetectionSource::GitConfig => "git config",
        DetectionSource::SshAgent => "ssh agent",
    }
}
