//! Key-value configuration providers.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Settings namespace; keys are addressed relative to it.
pub const NAMESPACE: &str = "gitPersona";

/// Host configuration provider.
///
/// Keys are relative to [`NAMESPACE`], e.g. `identities` or `logging.level`.
/// Implementations must not cache: every `get` reflects the current store.
pub trait ConfigurationProvider: Send + Sync {
    /// Read a key. `None` when unset.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a key.
    fn update(&self, key: &str, value: Value) -> Result<()>;
}

/// In-memory provider for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(self, key: impl Into<String>, value: Value) -> Self {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value);
        }
        self
    }
}

impl ConfigurationProvider for MemoryProvider {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn update(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::Settings("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Provider backed by a JSON settings file.
///
/// Accepts both the flat editor style (`"gitPersona.submoduleDepth": 2`) and
/// a nested object (`"gitPersona": {"submoduleDepth": 2}`). Flat keys win.
/// The file is re-read on every `get`. A missing file is empty settings.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Settings(format!(
                "{} must contain a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl ConfigurationProvider for JsonFileProvider {
    fn get(&self, key: &str) -> Option<Value> {
        let root = match self.load() {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read settings file");
                return None;
            }
        };
        if let Some(v) = root.get(&format!("{NAMESPACE}.{key}")) {
            return Some(v.clone());
        }
        let mut node = root.get(NAMESPACE)?;
        for part in key.split('.') {
            node = node.get(part)?;
        }
        Some(node.clone())
    }

    fn update(&self, key: &str, value: Value) -> Result<()> {
        let mut root = self.load()?;
        root.insert(format!("{NAMESPACE}.{key}"), value);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(&Value::Object(root))?;
        std::fs::write(&self.path, text + "\n")?;
        Ok(())
    }
}
