//! Identity records.
//!
//! An [`Identity`] is an immutable value read from settings. It is never
//! cached; callers get a fresh copy on every store query.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// One `@`, text on both sides, no whitespace, no leading `-`.
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@-][^\s@]*@[^\s@]+$").expect("email regex must compile"));

/// Maximum length of an identity id.
pub const MAX_ID_LEN: usize = 64;

/// Maximum length of a GPG key id.
pub const MAX_GPG_KEY_LEN: usize = 64;

/// A Git author persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable reference key, unique within the identity list.
    pub id: String,
    /// Written to `user.name` (prefixed with `icon` when set).
    pub name: String,
    /// Written to `user.email`.
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Private key path; a leading `~` means the home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_host: Option<String>,
    /// Presence enables commit signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Identity {
    /// Create an identity with the required fields only.
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            icon: None,
            ssh_key_path: None,
            ssh_host: None,
            gpg_key_id: None,
            service: None,
            description: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_ssh_key(mut self, path: impl Into<String>) -> Self {
        self.ssh_key_path = Some(path.into());
        self
    }

    pub fn with_gpg_key(mut self, key_id: impl Into<String>) -> Self {
        self.gpg_key_id = Some(key_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The value written to `user.name`: `"<icon> <name>"` when an icon is
    /// set, otherwise `name` verbatim.
    pub fn git_user_name(&self) -> String {
        match self.icon.as_deref().filter(|i| !i.is_empty()) {
            Some(icon) => format!("{icon} {}", self.name),
            None => self.name.clone(),
        }
    }

    /// Copy of this identity without its icon.
    pub fn without_icon(&self) -> Self {
        Self {
            icon: None,
            ..self.clone()
        }
    }

    /// Expanded SSH key path, if one is configured.
    pub fn expanded_ssh_key_path(&self) -> Option<PathBuf> {
        self.ssh_key_path.as_deref().map(expand_home)
    }

    /// Human readable one-line label.
    pub fn label(&self) -> String {
        format!("{} <{}>", self.git_user_name(), self.email)
    }

    /// Validate the record.
    pub fn validate(&self) -> Result<()> {
        validate_id(&self.id)?;
        let invalid = |msg: String| Err(Error::InvalidIdentity(format!("{}: {msg}", self.id)));

        if self.name.trim().is_empty() {
            return invalid("name is empty".into());
        }
        if self.name.starts_with('-') || self.name.chars().any(char::is_control) {
            return invalid("name contains a leading '-' or control characters".into());
        }
        if let Some(icon) = &self.icon {
            if icon.chars().any(char::is_control) || icon.starts_with('-') {
                return invalid("icon contains a leading '-' or control characters".into());
            }
        }
        if !is_valid_email(&self.email) {
            return invalid(format!("invalid email '{}'", self.email));
        }
        if let Some(key) = &self.gpg_key_id {
            if key.is_empty()
                || key.len() > MAX_GPG_KEY_LEN
                || !key.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return invalid("gpgKeyId must be 1-64 alphanumeric characters".into());
            }
        }
        if let Some(path) = &self.ssh_key_path {
            validate_key_path(path).map_err(|e| Error::InvalidIdentity(format!("{}: {e}", self.id)))?;
        }
        Ok(())
    }
}

/// Validate an identity id: 1-64 chars of `[A-Za-z0-9_-]`.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(Error::InvalidIdentity(format!(
            "id must be 1-{MAX_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidIdentity(format!(
            "id '{id}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

/// Validate an SSH key path before it reaches `ssh-add`.
pub fn validate_key_path(path: &str) -> std::result::Result<(), String> {
    if path.trim().is_empty() {
        return Err("sshKeyPath is empty".to_string());
    }
    if path.contains('\0') || path.contains('\n') || path.contains('\r') {
        return Err("sshKeyPath contains a NUL or line break".to_string());
    }
    if path.starts_with('-') {
        return Err("sshKeyPath must not start with '-'".to_string());
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    !email.chars().any(char::is_control) && EMAIL.is_match(email)
}

/// Expand a leading `~` to the home directory.
///
/// Only `~` alone or `~/...` is expanded; `~user` forms are left untouched.
pub fn expand_home(path: &str) -> PathBuf {
    expand_home_with(path, dirs::home_dir().as_deref())
}

pub(crate) fn expand_home_with(path: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(path);
    };
    if path == "~" {
        return home.to_path_buf();
    }
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// File name component of an expanded key path.
pub fn key_file_name(path: &str) -> Option<String> {
    expand_home(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_git_user_name_without_icon() {
        let id = Identity::new("work", "Alice Smith", "alice@work.com");
        assert_eq!(id.git_user_name(), "Alice Smith");
    }

    #[test]
    fn test_git_user_name_with_icon() {
        let id = Identity::new("work", "Alice Smith", "alice@work.com").with_icon("💼");
        assert_eq!(id.git_user_name(), "💼 Alice Smith");
        assert_eq!(id.without_icon().git_user_name(), "Alice Smith");

        // Empty icon is treated as absent
        let id = Identity::new("work", "Alice", "a@x.com").with_icon("");
        assert_eq!(id.git_user_name(), "Alice");
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "id": "oss",
            "name": "Alice",
            "email": "alice@oss.dev",
            "icon": "🌍",
            "sshKeyPath": "~/.ssh/id_oss",
            "sshHost": "github-oss",
            "gpgKeyId": "ABCDEF0123456789",
            "service": "GitHub",
            "description": "Open source"
        }"#;
        let id: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(id.ssh_key_path.as_deref(), Some("~/.ssh/id_oss"));
        assert_eq!(id.ssh_host.as_deref(), Some("github-oss"));
        assert_eq!(id.gpg_key_id.as_deref(), Some("ABCDEF0123456789"));
        assert!(id.validate().is_ok());

        let back = serde_json::to_value(&id).unwrap();
        assert_eq!(back["sshKeyPath"], "~/.ssh/id_oss");
    }

    #[test]
    fn test_validate_rejects_bad_records() {
        let ok = Identity::new("a", "A", "a@x.com");
        assert!(ok.validate().is_ok());
        assert!(ok.clone().with_gpg_key("KEY1").validate().is_ok());

        let cases = [
            Identity::new("", "A", "a@x.com"),
            Identity::new("has space", "A", "a@x.com"),
            Identity::new("a", "", "a@x.com"),
            Identity::new("a", "--global", "a@x.com"),
            Identity::new("a", "A\nB", "a@x.com"),
            Identity::new("a", "A", "not-an-email"),
            Identity::new("a", "A", "a@b@c"),
            Identity::new("a", "A", "a @x.com"),
            ok.clone().with_gpg_key("KEY-1"),
            ok.clone().with_gpg_key(""),
            ok.clone().with_ssh_key("-oProxyCommand=sh"),
            ok.clone().with_ssh_key(""),
        ];
        for case in cases {
            assert!(
                matches!(case.validate(), Err(Error::InvalidIdentity(_))),
                "expected invalid: {case:?}"
            );
        }
    }

    #[test]
    fn test_email_shapes() {
        for email in ["a@x", "first.last+tag@sub.example.org", "a-b@x.com"] {
            assert!(is_valid_email(email), "{email}");
        }
        for email in ["", "@x.com", "a@", "-a@x.com", "a@x\tcom", "a@x.com\u{7f}", "a@@x"] {
            assert!(!is_valid_email(email), "{email:?}");
        }
    }

    #[test]
    fn test_expand_home() {
        let home = Path::new("/home/alice");
        assert_eq!(
            expand_home_with("~/.ssh/id_work", Some(home)),
            PathBuf::from("/home/alice/.ssh/id_work")
        );
        assert_eq!(expand_home_with("~", Some(home)), PathBuf::from("/home/alice"));
        assert_eq!(
            expand_home_with("/etc/ssh/key", Some(home)),
            PathBuf::from("/etc/ssh/key")
        );
        assert_eq!(
            expand_home_with("~bob/.ssh/key", Some(home)),
            PathBuf::from("~bob/.ssh/key")
        );
        assert_eq!(
            expand_home_with("~/.ssh/key", None),
            PathBuf::from("~/.ssh/key")
        );
    }

    #[test]
    fn test_key_file_name() {
        assert_eq!(key_file_name("~/.ssh/id_work").as_deref(), Some("id_work"));
        assert_eq!(key_file_name("/keys/id_oss").as_deref(), Some("id_oss"));
    }
}
