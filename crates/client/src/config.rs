//! Client configuration from environment variables.

use std::path::PathBuf;

use jbchat_shared::Role;
use url::Url;

use crate::storage::FileStorage;

/// Backend used when `JB_BACKEND_URL` is unset or empty.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

/// Deployment-wide role policy applied when a sign-in carries no override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolePolicy {
    /// Classify by email: addresses containing "admin" are admins.
    #[default]
    Auto,
    /// Everyone signs in with this role.
    Fixed(Role),
}

impl RolePolicy {
    /// Parse a policy value. Quotes are stripped and whitespace trimmed;
    /// anything other than `admin` or `user` means [`RolePolicy::Auto`].
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.replace('"', "");
        match cleaned.trim() {
            "admin" => RolePolicy::Fixed(Role::Admin),
            "user" => RolePolicy::Fixed(Role::User),
            _ => RolePolicy::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the event server
    pub backend_url: Url,
    pub role_policy: RolePolicy,
    /// Where persisted session and credential entries live
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            role_policy: RolePolicy::Auto,
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Read configuration from the process environment.
    ///
    /// Environment variables:
    /// - `JB_BACKEND_URL`: event server base address (default: "http://localhost:8080")
    /// - `JB_STATIC_ROLE`: "admin" | "user" | "auto" (default: "auto")
    /// - `JB_STORAGE_DIR`: directory for persisted entries (default: platform config dir)
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let backend_url = match var("JB_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            Some(raw) => match Url::parse(raw.trim()) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "invalid JB_BACKEND_URL, using default");
                    default_backend_url()
                }
            },
            None => default_backend_url(),
        };

        let role_policy = var("JB_STATIC_ROLE")
            .map(|raw| RolePolicy::parse(&raw))
            .unwrap_or_default();

        let storage_dir = var("JB_STORAGE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            backend_url,
            role_policy,
            storage_dir,
        }
    }

    /// File storage for this configuration, if a directory can be resolved.
    pub fn file_storage(&self) -> Option<FileStorage> {
        match &self.storage_dir {
            Some(dir) => Some(FileStorage::new(dir.clone())),
            None => FileStorage::default_location(),
        }
    }
}

fn default_backend_url() -> Url {
    Url::parse(DEFAULT_BACKEND_URL).expect("default backend url is valid")
}
