//! Typed settings.
//!
//! The host configuration provider is duck-typed JSON. [`Settings::load`]
//! reads each recognised key once, checks its shape, and falls back to the
//! documented default (with a warning) when a value has the wrong type.

mod provider;

pub use provider::{ConfigurationProvider, JsonFileProvider, MemoryProvider, NAMESPACE};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::logging_impl::LogLevel;

/// Setting keys, relative to [`NAMESPACE`].
pub mod keys {
    pub const IDENTITIES: &str = "identities";
    pub const DEFAULT_IDENTITY: &str = "defaultIdentity";
    pub const AUTO_SWITCH_SSH_KEY: &str = "autoSwitchSshKey";
    pub const APPLY_TO_SUBMODULES: &str = "applyToSubmodules";
    pub const SUBMODULE_DEPTH: &str = "submoduleDepth";
    pub const SHOW_NOTIFICATIONS: &str = "showNotifications";
    pub const INCLUDE_ICON_IN_GIT_CONFIG: &str = "includeIconInGitConfig";
    pub const LOGGING_LEVEL: &str = "logging.level";
    pub const LOGGING_FILE_ENABLED: &str = "logging.fileEnabled";
    pub const LOGGING_MAX_FILE_SIZE: &str = "logging.maxFileSize";
    pub const LOGGING_MAX_FILES: &str = "logging.maxFiles";
}

/// Smallest accepted `submoduleDepth`.
pub const MIN_SUBMODULE_DEPTH: usize = 1;
/// Largest accepted `submoduleDepth`.
pub const MAX_SUBMODULE_DEPTH: usize = 5;

/// Logging sub-namespace. Only `level` is consumed here; the file sink
/// options are carried for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub file_enabled: bool,
    pub max_file_size: u64,
    pub max_files: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file_enabled: false,
            max_file_size: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Scalar settings (everything except the identity list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub default_identity: Option<String>,
    pub auto_switch_ssh_key: bool,
    pub apply_to_submodules: bool,
    /// Always within `MIN_SUBMODULE_DEPTH..=MAX_SUBMODULE_DEPTH`.
    pub submodule_depth: usize,
    pub show_notifications: bool,
    pub include_icon_in_git_config: bool,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_identity: None,
            auto_switch_ssh_key: true,
            apply_to_submodules: true,
            submodule_depth: 1,
            show_notifications: true,
            include_icon_in_git_config: false,
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Load and validate settings from `provider`.
    pub fn load(provider: &dyn ConfigurationProvider) -> Self {
        let defaults = Settings::default();
        let log_defaults = LoggingSettings::default();

        let requested_depth: i64 = read(provider, keys::SUBMODULE_DEPTH, 1);
        let submodule_depth = clamp_depth(requested_depth);

        Self {
            default_identity: read::<Option<String>>(provider, keys::DEFAULT_IDENTITY, None)
                .filter(|id| !id.is_empty()),
            auto_switch_ssh_key: read(
                provider,
                keys::AUTO_SWITCH_SSH_KEY,
                defaults.auto_switch_ssh_key,
            ),
            apply_to_submodules: read(
                provider,
                keys::APPLY_TO_SUBMODULES,
                defaults.apply_to_submodules,
            ),
            submodule_depth,
            show_notifications: read(
                provider,
                keys::SHOW_NOTIFICATIONS,
                defaults.show_notifications,
            ),
            include_icon_in_git_config: read(
                provider,
                keys::INCLUDE_ICON_IN_GIT_CONFIG,
                defaults.include_icon_in_git_config,
            ),
            logging: LoggingSettings {
                level: read(provider, keys::LOGGING_LEVEL, log_defaults.level),
                file_enabled: read(provider, keys::LOGGING_FILE_ENABLED, log_defaults.file_enabled),
                max_file_size: read(
                    provider,
                    keys::LOGGING_MAX_FILE_SIZE,
                    log_defaults.max_file_size,
                ),
                max_files: read(provider, keys::LOGGING_MAX_FILES, log_defaults.max_files),
            },
        }
    }
}

fn clamp_depth(requested: i64) -> usize {
    let min = MIN_SUBMODULE_DEPTH as i64;
    let max = MAX_SUBMODULE_DEPTH as i64;
    if !(min..=max).contains(&requested) {
        tracing::warn!(
            requested,
            min,
            max,
            "submoduleDepth out of range, clamping"
        );
    }
    requested.clamp(min, max) as usize
}

/// Read `key`, falling back to `default` when unset or mistyped.
fn read<T: DeserializeOwned>(provider: &dyn ConfigurationProvider, key: &str, default: T) -> T {
    match provider.get(key) {
        None | Some(serde_json::Value::Null) => default,
        Some(value) => match serde_json::from_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring setting with unexpected type");
                default
            }
        },
    }
}
