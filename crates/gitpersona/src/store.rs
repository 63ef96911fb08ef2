//! Identity store on top of a [`ConfigurationProvider`].
//!
//! Every query goes back to the provider, so edits made outside this process
//! are visible on the next call.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::identity::{Identity, validate_id};
use crate::settings::{ConfigurationProvider, Settings, keys};

/// Reads and writes identity records and scalar settings.
#[derive(Clone)]
pub struct IdentityStore {
    provider: Arc<dyn ConfigurationProvider>,
}

impl IdentityStore {
    pub fn new(provider: Arc<dyn ConfigurationProvider>) -> Self {
        Self { provider }
    }

    /// Current scalar settings.
    pub fn settings(&self) -> Settings {
        Settings::load(self.provider.as_ref())
    }

    /// All valid identities, in configuration order.
    ///
    /// Records that fail to parse or validate are skipped with a warning.
    /// When ids repeat, the first record wins.
    pub fn identities(&self) -> Vec<Identity> {
        let raw = match self.provider.get(keys::IDENTITIES) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                tracing::warn!("identities setting is not a list, ignoring");
                return Vec::new();
            }
        };

        let mut seen_ids = HashSet::new();
        let mut seen_emails = HashSet::new();
        let mut identities = Vec::with_capacity(raw.len());
        for (index, item) in raw.into_iter().enumerate() {
            let identity: Identity = match serde_json::from_value(item) {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping malformed identity");
                    continue;
                }
            };
            if let Err(e) = identity.validate() {
                tracing::warn!(index, error = %e, "skipping invalid identity");
                continue;
            }
            if !seen_ids.insert(identity.id.clone()) {
                tracing::warn!(id = %identity.id, "skipping identity with duplicate id");
                continue;
            }
            if !seen_emails.insert(identity.email.to_lowercase()) {
                tracing::warn!(
                    id = %identity.id,
                    "identity shares its email with an earlier one; detection picks the first"
                );
            }
            identities.push(identity);
        }
        identities
    }

    /// Identity with the given id.
    pub fn find(&self, id: &str) -> Option<Identity> {
        self.identities().into_iter().find(|i| i.id == id)
    }

    /// Identity named by `defaultIdentity`, if it exists.
    pub fn default_identity(&self) -> Option<Identity> {
        let id = self.settings().default_identity?;
        let found = self.find(&id);
        if found.is_none() {
            tracing::warn!(id = %id, "defaultIdentity does not match any identity");
        }
        found
    }

    /// Insert `identity`, replacing the record with the same id.
    pub fn upsert(&self, identity: Identity) -> Result<()> {
        identity.validate()?;
        let mut records = self.raw_records();
        let value = serde_json::to_value(&identity)?;
        match records.iter().position(|r| record_id(r) == Some(identity.id.as_str())) {
            Some(pos) => records[pos] = value,
            None => records.push(value),
        }
        self.provider.update(keys::IDENTITIES, Value::Array(records))
    }

    /// Remove the identity with `id`. Returns whether a record was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.raw_records();
        let before = records.len();
        records.retain(|r| record_id(r) != Some(id));
        if records.len() == before {
            return Ok(false);
        }
        self.provider.update(keys::IDENTITIES, Value::Array(records))?;
        Ok(true)
    }

    /// Set (or clear) `defaultIdentity`.
    pub fn set_default(&self, id: Option<&str>) -> Result<()> {
        let value = match id {
            Some(id) => {
                validate_id(id)?;
                if self.find(id).is_none() {
                    return Err(Error::IdentityNotFound(id.to_string()));
                }
                Value::String(id.to_string())
            }
            None => Value::Null,
        };
        self.provider.update(keys::DEFAULT_IDENTITY, value)
    }

    fn raw_records(&self) -> Vec<Value> {
        match self.provider.get(keys::IDENTITIES) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}
