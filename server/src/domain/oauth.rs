use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Record, RecordKind};

/// Registered API client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OauthApplication {
    pub uid: String,
    pub secret: String,
    pub name: String,
    /// Space-separated scope strings the application may be granted
    pub scopes: String,
    /// Jurisdiction system-context tokens act within
    #[serde(default)]
    pub jurisdiction_id: Option<i64>,
    /// Proxy user recorded as creator for system-context writes
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Record for OauthApplication {
    const KIND: RecordKind = RecordKind::OauthApplication;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub application_id: i64,
    /// Present for user-context tokens
    #[serde(default)]
    pub resource_owner_id: Option<i64>,
    pub scopes: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

impl Record for AccessToken {
    const KIND: RecordKind = RecordKind::AccessToken;
}

impl AccessToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}
