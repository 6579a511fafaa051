//! Session data as issued by the identity provider.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A signed-in user's credentials and identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token for backend calls
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token expiry (unix seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

/// Identity attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Free-form profile data from the provider (`full_name`, `name`, ...)
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Display name supplied by a federated provider, if any.
    pub fn display_name(&self) -> Option<&str> {
        ["full_name", "name"].iter().find_map(|key| {
            self.user
                .user_metadata
                .get(*key)
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|name| !name.is_empty())
        })
    }

    /// Whether the access token has expired. Sessions without an expiry
    /// never expire locally.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| expires_at <= Utc::now().timestamp())
            .unwrap_or(false)
    }
}
