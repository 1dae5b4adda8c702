pub mod export;
pub mod metadata;
pub mod oauth;
pub mod resources;
pub mod transaction;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Uri};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{FhirError, FhirResult, FHIR_JSON};

pub const JSON_PATCH: &str = "application/json-patch+json";
const RESOURCE_MEDIA_TYPES: [&str; 2] = [FHIR_JSON, "application/json"];

/// Media type of the request body without parameters such as `charset`.
fn media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
}

pub(crate) fn require_media_type(headers: &HeaderMap, accepted: &[&str]) -> FhirResult<()> {
    match media_type(headers) {
        Some(found) if accepted.contains(&found.as_str()) => Ok(()),
        found => Err(FhirError::unsupported_media_type(format!(
            "Content-Type '{}' is not supported; expected {}",
            found.unwrap_or_default(),
            accepted.join(" or ")
        ))),
    }
}

/// Decodes a resource body sent as FHIR JSON.
pub(crate) fn resource_body(headers: &HeaderMap, body: &Bytes) -> FhirResult<Value> {
    require_media_type(headers, &RESOURCE_MEDIA_TYPES)?;
    decode(body)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &Bytes) -> FhirResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| FhirError::bad_request(format!("Request body is not valid JSON: {}", e)))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn not_found(uri: Uri) -> FhirError {
    FhirError::not_found(format!("No route for {}", uri.path()))
}

pub async fn method_not_supported() -> FhirError {
    FhirError::method_not_allowed("This interaction is not supported on this endpoint")
}
