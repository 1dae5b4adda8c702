//! Loads jurisdictions, users, OAuth applications and access tokens from a
//! JSON seed document. Loading is idempotent: records that already exist
//! (matched by path, email, client id or token) are reused.

use std::collections::HashMap;
use std::path::Path;

use chrono::{Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::db::repository::find_one;
use crate::db::{Record, RecordKind, RecordQuery, Store, StoreError, Write};
use crate::domain::{AccessToken, Jurisdiction, OauthApplication, User};
use crate::services::writes::to_data;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid seed document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("seed refers to unknown {kind} '{key}'")]
    UnknownReference { kind: &'static str, key: String },
    #[error("store returned no record for the inserted {0}")]
    NotPersisted(RecordKind),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    /// Full jurisdiction paths; missing ancestors are created too
    pub jurisdictions: Vec<String>,
    pub users: Vec<SeedUser>,
    pub applications: Vec<SeedApplication>,
    pub access_tokens: Vec<SeedToken>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub email: String,
    pub jurisdiction: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedApplication {
    pub uid: String,
    pub secret: String,
    pub name: String,
    pub scopes: String,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    /// Email of the proxy user
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedToken {
    pub token: String,
    /// Client id of the owning application
    pub application: String,
    #[serde(default)]
    pub user: Option<String>,
    pub scopes: String,
    #[serde(default = "default_token_lifetime")]
    pub expires_in: i64,
}

fn default_token_lifetime() -> i64 {
    7200
}

/// Ids assigned to seeded records, keyed by their natural keys.
#[derive(Debug, Default, Clone)]
pub struct Seeded {
    pub jurisdictions: HashMap<String, i64>,
    pub users: HashMap<String, i64>,
    pub applications: HashMap<String, i64>,
    pub tokens: HashMap<String, i64>,
}

impl Seeded {
    fn lookup(map: &HashMap<String, i64>, kind: &'static str, key: &str) -> Result<i64, SeedError> {
        map.get(key).copied().ok_or_else(|| SeedError::UnknownReference {
            kind,
            key: key.to_string(),
        })
    }
}

impl Seed {
    pub async fn from_file(path: &Path) -> Result<Self, SeedError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn load(&self, store: &dyn Store) -> Result<Seeded, SeedError> {
        let mut seeded = Seeded::default();

        for path in &self.jurisdictions {
            let segments: Vec<&str> = path.split(',').map(str::trim).collect();
            for depth in 1..=segments.len() {
                let ancestor = segments[..depth].join(", ");
                if seeded.jurisdictions.contains_key(&ancestor) {
                    continue;
                }
                let id = ensure(store, "path", &ancestor, |j: &Jurisdiction| j.path == ancestor, || {
                    Jurisdiction::new(ancestor.clone())
                })
                .await?;
                seeded.jurisdictions.insert(ancestor, id);
            }
        }

        for user in &self.users {
            let jurisdiction_id =
                Seeded::lookup(&seeded.jurisdictions, "jurisdiction", &user.jurisdiction)?;
            let id = ensure(store, "email", &user.email, |u: &User| u.email == user.email, || User {
                email: user.email.clone(),
                jurisdiction_id,
            })
            .await?;
            seeded.users.insert(user.email.clone(), id);
        }

        for app in &self.applications {
            let jurisdiction_id = app
                .jurisdiction
                .as_deref()
                .map(|path| Seeded::lookup(&seeded.jurisdictions, "jurisdiction", path))
                .transpose()?;
            let user_id = app
                .user
                .as_deref()
                .map(|email| Seeded::lookup(&seeded.users, "user", email))
                .transpose()?;
            let id = ensure(
                store,
                "uid",
                &app.uid,
                |a: &OauthApplication| a.uid == app.uid,
                || OauthApplication {
                    uid: app.uid.clone(),
                    secret: app.secret.clone(),
                    name: app.name.clone(),
                    scopes: app.scopes.clone(),
                    jurisdiction_id,
                    user_id,
                },
            )
            .await?;
            seeded.applications.insert(app.uid.clone(), id);
        }

        let now = Utc::now();
        for token in &self.access_tokens {
            let application_id =
                Seeded::lookup(&seeded.applications, "application", &token.application)?;
            let resource_owner_id = token
                .user
                .as_deref()
                .map(|email| Seeded::lookup(&seeded.users, "user", email))
                .transpose()?;
            let id = ensure(
                store,
                "token",
                &token.token,
                |t: &AccessToken| t.token == token.token,
                || AccessToken {
                    token: token.token.clone(),
                    application_id,
                    resource_owner_id,
                    scopes: token.scopes.clone(),
                    expires_at: now + Duration::seconds(token.expires_in),
                    revoked: false,
                },
            )
            .await?;
            seeded.tokens.insert(token.token.clone(), id);
        }

        tracing::info!(
            "✓ Seed loaded: {} jurisdictions, {} users, {} applications, {} tokens",
            seeded.jurisdictions.len(),
            seeded.users.len(),
            seeded.applications.len(),
            seeded.tokens.len()
        );
        Ok(seeded)
    }
}

/// Returns the id of the record whose `field` equals `key`, inserting
/// `build()` when there is none.
async fn ensure<T: Record>(
    store: &dyn Store,
    field: &str,
    key: &str,
    matches: impl Fn(&T) -> bool,
    build: impl FnOnce() -> T,
) -> Result<i64, SeedError> {
    let query = RecordQuery::new(T::KIND).with_field(field, key);
    if let Some(existing) = find_one::<T>(store, query).await? {
        if matches(&existing.record) {
            return Ok(existing.id);
        }
    }
    let applied = store.apply(vec![Write::insert(T::KIND, to_data(&build())?)]).await?;
    applied
        .first()
        .map(|record| record.id)
        .ok_or(SeedError::NotPersisted(T::KIND))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;

    fn seed() -> Seed {
        serde_json::from_value(json!({
            "jurisdictions": ["USA, State 1, County 1", "USA, State 2"],
            "users": [{"email": "epi@example.com", "jurisdiction": "USA, State 1"}],
            "applications": [{
                "uid": "client-1",
                "secret": "s3cret",
                "name": "Lab system",
                "scopes": "system/Patient.read system/Observation.*",
                "jurisdiction": "USA, State 1"
            }],
            "access_tokens": [{
                "token": "tok-1",
                "application": "client-1",
                "scopes": "system/Patient.read"
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_creates_ancestors_and_links() {
        let store = MemoryStore::new();
        let seeded = seed().load(&store).await.unwrap();

        let paths: Vec<&str> = {
            let mut paths: Vec<&str> = seeded.jurisdictions.keys().map(String::as_str).collect();
            paths.sort();
            paths
        };
        assert_eq!(
            paths,
            vec!["USA", "USA, State 1", "USA, State 1, County 1", "USA, State 2"]
        );
        assert_eq!(seeded.users.len(), 1);
        assert!(seeded.tokens.contains_key("tok-1"));
    }

    #[tokio::test]
    async fn test_loading_twice_reuses_records() {
        let store = MemoryStore::new();
        let first = seed().load(&store).await.unwrap();
        let second = seed().load(&store).await.unwrap();
        assert_eq!(first.jurisdictions, second.jurisdictions);
        assert_eq!(first.applications, second.applications);

        let count = store
            .count(&RecordQuery::new(RecordKind::Jurisdiction))
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_rejected() {
        let seed: Seed = serde_json::from_value(json!({
            "users": [{"email": "x@example.com", "jurisdiction": "Nowhere"}]
        }))
        .unwrap();
        let err = seed.load(&MemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, SeedError::UnknownReference { kind: "jurisdiction", .. }));
    }
}
