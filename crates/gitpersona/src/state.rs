//! Persisted per-workspace cache of the last resolved identity id.
//!
//! This is a cache, not the source of truth: detection can always rebuild it
//! from git config and the SSH agent.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Key under which the current identity id is stored.
pub const CURRENT_IDENTITY_KEY: &str = "currentIdentityId";

/// Per-workspace string store.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Set `key`, or remove it when `value` is `None`.
    fn set(&self, key: &str, value: Option<&str>) -> Result<()>;
}

/// In-memory state; lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<Map<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .ok()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::State("state lock poisoned".to_string()))?;
        match value {
            Some(v) => values.insert(key.to_string(), Value::String(v.to_string())),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// JSON file shared by all workspaces, one object per workspace path.
///
/// ```json
/// { "/home/alice/src/project": { "currentIdentityId": "work" } }
/// ```
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
    workspace: String,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>, workspace: &Path) -> Self {
        Self {
            path: path.into(),
            workspace: workspace.to_string_lossy().into_owned(),
        }
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => Err(Error::State(format!(
                "{} is not a valid state file",
                self.path.display()
            ))),
        }
    }
}

impl StateStore for JsonStateStore {
    fn get(&self, key: &str) -> Option<String> {
        let root = match self.load() {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read workspace state");
                return None;
            }
        };
        root.get(&self.workspace)?
            .get(key)?
            .as_str()
            .map(str::to_string)
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        // Corrupt files are overwritten
        let mut root = self.load().unwrap_or_default();
        let entry = root
            .entry(self.workspace.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            match value {
                Some(v) => map.insert(key.to_string(), Value::String(v.to_string())),
                None => map.remove(key),
            };
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(root))?)?;
        Ok(())
    }
}
