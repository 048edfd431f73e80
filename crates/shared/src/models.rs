//! Identity and presentation data shared across the client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Id given to every locally signed-in user; there is no identity provider
/// to hand out real ones.
pub const STATIC_USER_ID: &str = "static-user";

/// Application role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Signed-in identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
}

impl User {
    /// Build the local identity for an email address.
    pub fn local(email: impl Into<String>) -> Self {
        Self {
            id: STATIC_USER_ID.to_string(),
            email: email.into(),
        }
    }
}

// --- Model suggestion dialog ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelAlternative {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub recommended_for: String,
}

/// Props handed to the model-suggestion dialog. The dialog keeps no state of
/// its own; it answers with a confirmed model id or a cancel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSuggestion {
    pub is_open: bool,
    pub suggested_model: String,
    pub reason: String,
    #[serde(default)]
    pub alternatives: Vec<ModelAlternative>,
}

impl ModelSuggestion {
    /// Models offered to the user. Falls back to the suggested model alone
    /// when no alternatives were supplied.
    pub fn choices(&self) -> Vec<ModelAlternative> {
        if !self.alternatives.is_empty() {
            return self.alternatives.clone();
        }
        vec![ModelAlternative {
            id: self.suggested_model.clone(),
            name: self.suggested_model.clone(),
            recommended_for: String::new(),
        }]
    }

    /// Turn the dialog's pick into a response. Closing the dialog, or
    /// picking an id that was never offered, is a cancel.
    pub fn answer(&self, picked: Option<&str>) -> SuggestionResponse {
        match picked {
            Some(id) if self.choices().iter().any(|m| m.id == id) => {
                SuggestionResponse::Confirm(id.to_string())
            }
            _ => SuggestionResponse::Cancel,
        }
    }
}

/// Outcome reported by the dialog collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionResponse {
    Confirm(String),
    Cancel,
}
