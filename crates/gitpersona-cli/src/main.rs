//! GitPersona CLI - Switch between Git identities per repository
//!
//! Usage:
//!   gitpersona list                # Configured identities
//!   gitpersona show                # Current identity for this workspace
//!   gitpersona switch work         # Make "work" the current identity
//!   gitpersona select              # Switch to the configured default
//!   gitpersona keys                # Keys loaded in the SSH agent

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gitpersona::{
    IdentityResolver, IdentityStore, JsonFileProvider, JsonStateStore, LogLevel,
    SecureProcessRunner, Settings,
};

/// GitPersona - Git identity switcher
#[derive(Parser, Debug)]
#[command(name = "gitpersona")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (default: <config dir>/gitpersona/settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// State file (default: <data dir>/gitpersona/state.json)
    #[arg(long, global = true, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Workspace folder (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured identities
    List,
    /// Show the current identity
    Show,
    /// Detect the identity from git config and the SSH agent
    Detect,
    /// Switch to an identity
    Switch {
        /// Identity id
        id: String,
    },
    /// Switch to an identity, or to the configured default
    Select {
        /// Identity id (default: defaultIdentity setting)
        id: Option<String>,
    },
    /// List keys loaded in the SSH agent
    Keys,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings_path = match args.settings {
        Some(path) => path,
        None => default_file(dirs::config_dir(), "settings.json")
            .context("Cannot determine config directory, pass --settings")?,
    };
    let state_path = match args.state {
        Some(path) => path,
        None => default_file(dirs::data_dir(), "state.json")
            .context("Cannot determine data directory, pass --state")?,
    };
    let workspace = match args.workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let store = IdentityStore::new(Arc::new(JsonFileProvider::new(&settings_path)));
    let settings = load_settings(&store, init_tracing);
    tracing::debug!(settings = %settings_path.display(), workspace = %workspace.display(), "starting");

    let state = Arc::new(JsonStateStore::new(state_path, &workspace));
    let runner = Arc::new(SecureProcessRunner::new());
    let mut resolver = IdentityResolver::new(store, runner, state, Some(workspace));

    let notify = commands::Notifier::new(settings.show_notifications);
    match args.command {
        Command::List => commands::list(&mut resolver).await,
        Command::Show => commands::show(&mut resolver, true).await,
        Command::Detect => commands::show(&mut resolver, false).await,
        Command::Switch { id } => commands::switch(&mut resolver, &id, &notify).await,
        Command::Select { id } => {
            let id = id
                .or(settings.default_identity)
                .context("No identity given and no defaultIdentity configured")?;
            commands::switch(&mut resolver, &id, &notify).await
        }
        Command::Keys => commands::keys(&resolver).await,
    }
}

/// Read the log level, install logging, then load the settings that are
/// actually used so their validation warnings are emitted.
fn load_settings(store: &IdentityStore, init: impl FnOnce(LogLevel)) -> Settings {
    init(store.settings().logging.level);
    store.settings()
}

/// `RUST_LOG` wins over the `logging.level` setting.
fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.filter_directive())),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn default_file(base: Option<PathBuf>, name: &str) -> Option<PathBuf> {
    base.map(|dir| app_dir(&dir).join(name))
}

fn app_dir(base: &Path) -> PathBuf {
    base.join("gitpersona")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file() {
        assert_eq!(
            default_file(Some(PathBuf::from("/cfg")), "settings.json"),
            Some(PathBuf::from("/cfg/gitpersona/settings.json"))
        );
        assert_eq!(default_file(None, "state.json"), None);
    }

    #[test]
    fn test_settings_loaded_after_logging_init() {
        use gitpersona::settings::keys;
        use gitpersona::{ConfigurationProvider, MemoryProvider};

        let provider = Arc::new(MemoryProvider::new().with(keys::LOGGING_LEVEL, serde_json::json!("DEBUG")));
        let store = IdentityStore::new(provider.clone());

        let mut seen = None;
        let settings = load_settings(&store, |level| {
            seen = Some(level);
            // Anything read after this point happens with logging installed
            provider
                .update(keys::SUBMODULE_DEPTH, serde_json::json!(9))
                .unwrap();
        });
        assert_eq!(seen, Some(LogLevel::Debug));
        assert_eq!(settings.submodule_depth, 5, "depth read and clamped after init");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "gitpersona",
            "switch",
            "work",
            "--workspace",
            "/repo",
        ])
        .unwrap();
        assert_eq!(args.workspace, Some(PathBuf::from("/repo")));
        assert!(matches!(args.command, Command::Switch { ref id } if id == "work"));

        let args = Args::try_parse_from(["gitpersona", "select"]).unwrap();
        assert!(matches!(args.command, Command::Select { id: None }));

        assert!(Args::try_parse_from(["gitpersona"]).is_err());
    }
}
