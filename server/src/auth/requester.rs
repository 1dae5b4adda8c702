use std::collections::BTreeMap;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{DateTime, Utc};

use super::access;
use super::scopes::{Access, ScopeContext, ScopeSet};
use crate::db::repository::{find, find_one};
use crate::db::{RecordKind, RecordQuery, Store, StoreError};
use crate::domain::{AccessToken, Jurisdiction, OauthApplication, User};
use crate::error::{FhirError, FhirResult};
use crate::serializer::ResourceType;
use crate::AppState;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Requester {
    pub token_id: i64,
    pub application_id: i64,
    pub context: ScopeContext,
    pub scopes: ScopeSet,
    pub jurisdiction_id: i64,
    /// The requester's jurisdiction and all of its descendants
    pub jurisdictions: BTreeMap<i64, Jurisdiction>,
    /// User recorded as creator of new records
    pub actor_id: Option<i64>,
    /// Name written into history entries
    pub display: String,
}

fn bearer_token(headers: &HeaderMap) -> FhirResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| FhirError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| FhirError::unauthorized("Malformed Authorization header"))?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| FhirError::unauthorized("Malformed Authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(FhirError::unauthorized(
            "Authorization header must carry a Bearer token",
        ));
    }
    Ok(token.trim())
}

impl Requester {
    pub async fn authenticate(
        store: &dyn Store,
        token: &str,
        now: DateTime<Utc>,
    ) -> FhirResult<Self> {
        let query = RecordQuery::new(RecordKind::AccessToken).with_field("token", token);
        let access_token = find_one::<AccessToken>(store, query)
            .await?
            .filter(|t| t.record.token == token)
            .ok_or_else(|| FhirError::unauthorized("Invalid access token"))?;
        if !access_token.record.is_usable(now) {
            return Err(FhirError::unauthorized("Access token is expired or revoked"));
        }

        let application = find::<OauthApplication>(store, access_token.record.application_id)
            .await?
            .ok_or_else(|| FhirError::unauthorized("Access token's application no longer exists"))?;

        let (context, jurisdiction_id, actor_id, display) =
            match access_token.record.resource_owner_id {
                Some(user_id) => {
                    let user = find::<User>(store, user_id)
                        .await?
                        .ok_or_else(|| FhirError::unauthorized("Access token's user no longer exists"))?;
                    (
                        ScopeContext::User,
                        user.record.jurisdiction_id,
                        Some(user.id),
                        user.record.email,
                    )
                }
                None => {
                    let jurisdiction_id = application.record.jurisdiction_id.ok_or_else(|| {
                        FhirError::forbidden("Application is not assigned a jurisdiction")
                    })?;
                    (
                        ScopeContext::System,
                        jurisdiction_id,
                        application.record.user_id,
                        application.record.name.clone(),
                    )
                }
            };

        let jurisdictions = access::subtree(store, jurisdiction_id).await?;
        if jurisdictions.is_empty() {
            return Err(FhirError::forbidden("Requester's jurisdiction does not exist"));
        }

        Ok(Self {
            token_id: access_token.id,
            application_id: application.id,
            context,
            scopes: ScopeSet::parse(&access_token.record.scopes),
            jurisdiction_id,
            jurisdictions,
            actor_id,
            display,
        })
    }

    pub fn can(&self, resource_type: ResourceType, access: Access) -> bool {
        self.scopes.permits(self.context, resource_type, access)
    }

    pub fn require(&self, resource_type: ResourceType, access: Access) -> FhirResult<()> {
        if self.can(resource_type, access) {
            Ok(())
        } else {
            Err(FhirError::forbidden(format!(
                "Access token does not grant {}/{}.{}",
                self.context.as_str(),
                resource_type,
                access.as_str()
            )))
        }
    }

    pub fn jurisdiction_ids(&self) -> Vec<i64> {
        self.jurisdictions.keys().copied().collect()
    }

    pub fn can_access(&self, jurisdiction_id: Option<i64>) -> bool {
        jurisdiction_id.is_some_and(|id| self.jurisdictions.contains_key(&id))
    }

    pub fn jurisdiction_path(&self, id: Option<i64>) -> Option<&str> {
        id.and_then(|id| self.jurisdictions.get(&id))
            .map(|j| j.path.as_str())
    }

    /// Id of the jurisdiction with this path, if it is within reach.
    pub fn jurisdiction_by_path(&self, path: &str) -> Option<i64> {
        self.jurisdictions
            .iter()
            .find(|(_, j)| j.path == path)
            .map(|(id, _)| *id)
    }

    /// Ids of every patient assigned to a reachable jurisdiction.
    pub async fn accessible_patient_ids(&self, store: &dyn Store) -> Result<Vec<i64>, StoreError> {
        access::patient_ids_in(store, self.jurisdiction_ids()).await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Requester {
    type Rejection = FhirError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let requester = Requester::authenticate(state.store.as_ref(), token, Utc::now()).await?;
        tracing::debug!(
            application = requester.application_id,
            context = requester.context.as_str(),
            "Authenticated request"
        );
        Ok(requester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");
    }
}
