//! Authentication session management with storage persistence.
//!
//! There is no identity provider behind this: signing in records the email
//! and a derived role locally and that is the whole session. The bearer
//! credential used by the realtime connection lives under a separate key and
//! is written by whichever login flow issues tokens.

use std::sync::Arc;

use jbchat_shared::{AuthError, Provider, Role, User};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::RolePolicy;
use crate::storage::{self, Storage};

/// Storage key of the persisted `{ email, role }` session.
pub const SESSION_STORAGE_KEY: &str = "jb_static_auth";
/// Storage key of the persisted `{ token }` credential.
pub const CREDENTIAL_STORAGE_KEY: &str = "jb_static_auth_session";

/// Session state published to the rest of the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub role: Option<Role>,
    /// True until the one-time hydration from storage has completed.
    pub is_loading: bool,
}

impl AuthState {
    fn loading() -> Self {
        Self {
            user: None,
            role: None,
            is_loading: true,
        }
    }

    fn signed_out() -> Self {
        Self {
            user: None,
            role: None,
            is_loading: false,
        }
    }

    fn signed_in(user: User, role: Role) -> Self {
        Self {
            user: Some(user),
            role: Some(role),
            is_loading: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Stored session data
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<serde_json::Value>,
}

impl PersistedSession {
    fn into_state(self) -> Option<AuthState> {
        let email = self.email.filter(|e| !e.is_empty())?;
        let role = match self.role.as_ref().and_then(|r| r.as_str()) {
            Some("admin") => Role::Admin,
            _ => Role::User,
        };
        Some(AuthState::signed_in(User::local(email), role))
    }
}

/// Decide the role for a sign-in.
///
/// An explicit override wins, then a fixed deployment policy, and otherwise
/// any email containing "admin" (case-insensitive) is an admin. This is a
/// convenience classification, not an authorization check.
pub fn compute_role(role_override: Option<Role>, policy: RolePolicy, email: &str) -> Role {
    if let Some(role) = role_override {
        return role;
    }
    match policy {
        RolePolicy::Fixed(role) => role,
        RolePolicy::Auto if email.to_lowercase().contains("admin") => Role::Admin,
        RolePolicy::Auto => Role::User,
    }
}

/// Owns the persisted identity and publishes [`AuthState`] changes.
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    policy: RolePolicy,
    state: watch::Sender<AuthState>,
}

impl SessionStore {
    /// Create a store in the loading state. Call [`SessionStore::hydrate`]
    /// to read the persisted session.
    pub fn new(storage: Arc<dyn Storage>, policy: RolePolicy) -> Self {
        let (state, _) = watch::channel(AuthState::loading());
        Self {
            storage,
            policy,
            state,
        }
    }

    /// Create a store and hydrate it immediately.
    pub fn open(storage: Arc<dyn Storage>, policy: RolePolicy) -> Self {
        let mut store = Self::new(storage, policy);
        store.hydrate();
        store
    }

    /// Read the persisted session once.
    ///
    /// Missing or malformed entries resolve to the signed-out state. Calls
    /// after the store has left the loading state do nothing, so a sign-in
    /// that raced ahead of hydration is never overwritten.
    pub fn hydrate(&mut self) {
        if !self.state.borrow().is_loading {
            return;
        }

        let restored = storage::load::<PersistedSession>(self.storage.as_ref(), SESSION_STORAGE_KEY)
            .and_then(PersistedSession::into_state);

        match restored {
            Some(state) => {
                tracing::debug!(role = ?state.role, "restored persisted session");
                self.publish(state);
            }
            None => self.publish(AuthState::signed_out()),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receive every future state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn policy(&self) -> RolePolicy {
        self.policy
    }

    /// Sign in with an email. The password is accepted but not checked.
    pub fn sign_in(
        &mut self,
        email: &str,
        _password: &str,
        role_override: Option<Role>,
    ) -> Result<(), AuthError> {
        self.set_local_user(email, role_override);
        Ok(())
    }

    /// Same effect as [`SessionStore::sign_in`]. There is never a pending
    /// confirmation, so the returned data is always `None`.
    pub fn sign_up(
        &mut self,
        email: &str,
        _password: &str,
        role_override: Option<Role>,
    ) -> Result<Option<User>, AuthError> {
        self.set_local_user(email, role_override);
        Ok(None)
    }

    /// Clear the persisted session and publish the signed-out state.
    pub fn sign_out(&mut self) -> Result<(), AuthError> {
        if let Err(e) = storage::remove(self.storage.as_ref(), SESSION_STORAGE_KEY) {
            tracing::warn!(error = %e, "failed to remove persisted session");
        }
        self.publish(AuthState::signed_out());
        Ok(())
    }

    pub fn sign_in_with_google(&self) -> Result<(), AuthError> {
        Err(AuthError::ProviderDisabled(Provider::Google))
    }

    pub fn sign_in_with_github(&self) -> Result<(), AuthError> {
        Err(AuthError::ProviderDisabled(Provider::Github))
    }

    fn set_local_user(&mut self, email: &str, role_override: Option<Role>) {
        let role = compute_role(role_override, self.policy, email);
        self.publish(AuthState::signed_in(User::local(email), role));

        let persisted = PersistedSession {
            email: Some(email.to_string()),
            role: Some(serde_json::Value::from(role.as_str())),
        };
        if let Err(e) = storage::save(self.storage.as_ref(), SESSION_STORAGE_KEY, &persisted) {
            tracing::warn!(error = %e, "failed to persist session");
        }
    }

    fn publish(&self, state: AuthState) {
        self.state.send_replace(state);
    }
}

/// Read the bearer credential for the realtime connection.
///
/// Absent entries, malformed JSON and non-string tokens all read as `""`.
pub fn read_credential(storage: &dyn Storage) -> String {
    storage::load::<serde_json::Value>(storage, CREDENTIAL_STORAGE_KEY)
        .and_then(|entry| entry.get("token")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Persist a bearer credential, as a token-issuing login flow would.
pub fn store_credential(storage: &dyn Storage, token: &str) -> Result<(), storage::StorageError> {
    storage::save(storage, CREDENTIAL_STORAGE_KEY, &serde_json::json!({ "token": token }))
}
