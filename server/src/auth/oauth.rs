//! OAuth2 token issuance (client credentials grant).

use std::collections::HashSet;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::find_one;
use crate::db::{RecordKind, RecordQuery, Store, StoreError, Write};
use crate::domain::{AccessToken, OauthApplication};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// Error body defined by RFC 6749 section 5.2
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OAuthError {
    pub error: String,
    pub error_description: String,
}

impl OAuthError {
    fn new(error: &str, description: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_client" => StatusCode::UNAUTHORIZED,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        tracing::error!("storage failure during token issuance: {}", err);
        OAuthError::new("server_error", "The token could not be issued")
    }
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub async fn issue_token(
    store: &dyn Store,
    request: TokenRequest,
    ttl_secs: i64,
    now: DateTime<Utc>,
) -> Result<TokenResponse, OAuthError> {
    match request.grant_type.as_deref() {
        Some("client_credentials") => {}
        Some(other) => {
            return Err(OAuthError::new(
                "unsupported_grant_type",
                format!("Grant type '{}' is not supported", other),
            ))
        }
        None => return Err(OAuthError::new("invalid_request", "grant_type is required")),
    }

    let (Some(client_id), Some(client_secret)) = (request.client_id, request.client_secret) else {
        return Err(OAuthError::new(
            "invalid_client",
            "client_id and client_secret are required",
        ));
    };

    let query = RecordQuery::new(RecordKind::OauthApplication).with_field("uid", client_id.as_str());
    let application = find_one::<OauthApplication>(store, query)
        .await?
        .filter(|app| app.record.uid == client_id && app.record.secret == client_secret)
        .ok_or_else(|| OAuthError::new("invalid_client", "Client authentication failed"))?;

    let allowed: HashSet<&str> = application.record.scopes.split_whitespace().collect();
    let granted = match request.scope.as_deref().map(str::trim) {
        Some(requested) if !requested.is_empty() => {
            if let Some(denied) = requested.split_whitespace().find(|s| !allowed.contains(s)) {
                return Err(OAuthError::new(
                    "invalid_scope",
                    format!("Scope '{}' is not granted to this client", denied),
                ));
            }
            requested.split_whitespace().collect::<Vec<_>>().join(" ")
        }
        _ => application.record.scopes.clone(),
    };

    let token = AccessToken {
        token: new_token(),
        application_id: application.id,
        resource_owner_id: None,
        scopes: granted.clone(),
        expires_at: now + Duration::seconds(ttl_secs),
        revoked: false,
    };
    let data = serde_json::to_value(&token).map_err(StoreError::from)?;
    store
        .apply(vec![Write::insert(RecordKind::AccessToken, data)])
        .await?;

    tracing::info!("✓ Access token issued to application {}", application.record.name);
    Ok(TokenResponse {
        access_token: token.token,
        token_type: "Bearer".to_string(),
        expires_in: ttl_secs,
        scope: granted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    async fn store_with_client() -> MemoryStore {
        let store = MemoryStore::new();
        let app = OauthApplication {
            uid: "client-1".to_string(),
            secret: "s3cret".to_string(),
            name: "Lab Feed".to_string(),
            scopes: "system/Patient.read system/Observation.*".to_string(),
            jurisdiction_id: Some(1),
            user_id: None,
        };
        store
            .apply(vec![Write::insert(
                RecordKind::OauthApplication,
                serde_json::to_value(app).unwrap(),
            )])
            .await
            .unwrap();
        store
    }

    fn request(grant: &str, secret: &str, scope: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: Some(grant.to_string()),
            client_id: Some("client-1".to_string()),
            client_secret: Some(secret.to_string()),
            scope: scope.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_issues_subset_of_scopes() {
        let store = store_with_client().await;
        let response = issue_token(
            &store,
            request("client_credentials", "s3cret", Some("system/Patient.read")),
            60,
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(response.scope, "system/Patient.read");
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.access_token.len(), 64);

        let stored = store
            .query(&RecordQuery::new(RecordKind::AccessToken))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let store = store_with_client().await;
        let now = Utc::now();

        let err = issue_token(&store, request("client_credentials", "wrong", None), 60, now)
            .await
            .unwrap_err();
        assert_eq!(err.error, "invalid_client");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = issue_token(
            &store,
            request("client_credentials", "s3cret", Some("system/Patient.write")),
            60,
            now,
        )
        .await
        .unwrap_err();
        assert_eq!(err.error, "invalid_scope");

        let err = issue_token(&store, request("password", "s3cret", None), 60, now)
            .await
            .unwrap_err();
        assert_eq!(err.error, "unsupported_grant_type");
    }
}
