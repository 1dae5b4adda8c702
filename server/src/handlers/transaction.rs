use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;

use super::resource_body;
use crate::auth::Requester;
use crate::error::{FhirJson, FhirResult};
use crate::models::Bundle;
use crate::transaction;
use crate::AppState;

/// `POST /fhir/r4` with a transaction Bundle.
pub async fn process_bundle(
    State(state): State<AppState>,
    requester: Requester,
    headers: HeaderMap,
    body: Bytes,
) -> FhirResult<FhirJson<Bundle>> {
    let body = resource_body(&headers, &body)?;
    let response =
        transaction::process(state.store.as_ref(), &state.config, &requester, body).await?;
    Ok(FhirJson(response))
}
