//! Bulk Data `$export`: kick-off, background job and NDJSON files.

pub mod job;
pub mod registry;
pub mod writer;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{Access, Requester};
use crate::db::StoreError;
use crate::error::{FhirError, FhirResult};
use crate::serializer::ResourceType;
use crate::AppState;

pub use job::{ExportContext, ExportRequest};
pub use registry::{ExportJob, ExportManifest, ExportRegistry, ExportStatus};

pub const NDJSON: &str = "application/fhir+ndjson";
const OUTPUT_FORMATS: [&str; 3] = [NDJSON, "application/ndjson", "ndjson"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("an export is already in progress for this application")]
    AlreadyRunning,
    #[error("export file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates kick-off parameters and works out the types to export.
pub fn parse_request(
    requester: &Requester,
    prefer: Option<&str>,
    params: &HashMap<String, String>,
    url: String,
) -> FhirResult<ExportRequest> {
    let respond_async = prefer.is_some_and(|p| {
        p.split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("respond-async"))
    });
    if !respond_async {
        return Err(FhirError::bad_request(
            "Bulk export requires the header 'Prefer: respond-async'",
        ));
    }

    if let Some(format) = params.get("_outputFormat") {
        if !OUTPUT_FORMATS.contains(&format.as_str()) {
            return Err(FhirError::bad_request(format!(
                "Unsupported _outputFormat '{}'",
                format
            )));
        }
    }

    let since = params
        .get("_since")
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| {
                    FhirError::bad_request(format!("_since '{}' is not a valid FHIR instant", raw))
                })
        })
        .transpose()?;

    let types = match params.get("_type") {
        Some(raw) => {
            let mut types = Vec::new();
            for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let resource_type = name.parse::<ResourceType>().map_err(FhirError::bad_request)?;
                requester.require(resource_type, Access::Read)?;
                if !types.contains(&resource_type) {
                    types.push(resource_type);
                }
            }
            types
        }
        None => ResourceType::ALL
            .into_iter()
            .filter(|t| requester.can(*t, Access::Read))
            .collect(),
    };
    if types.is_empty() {
        return Err(FhirError::forbidden(
            "Access token does not grant read access to any exportable resource type",
        ));
    }

    Ok(ExportRequest { types, since, url })
}

/// Forgets jobs that finished longer ago than the retention period and
/// deletes their files.
pub async fn evict_expired(state: &AppState) {
    let cutoff = Utc::now() - Duration::seconds(state.config.export_retention_secs);
    for id in state.exports.evict_finished(cutoff) {
        match writer::remove_job_dir(&state.config.export_dir, &id.to_string()).await {
            Ok(()) => tracing::info!("✓ Export {} expired and was removed", id),
            Err(err) => tracing::warn!("Failed to remove files of export {}: {}", id, err),
        }
    }
}

/// Registers the job and starts it in the background.
pub fn kick_off(state: &AppState, requester: Requester, request: ExportRequest) -> FhirResult<Uuid> {
    let id = state
        .exports
        .start(requester.application_id, request.url.clone())
        .map_err(|_| {
            FhirError::too_many_requests(
                "You have already initiated an export; wait for it to complete before starting another",
            )
        })?;

    let ctx = ExportContext {
        store: state.store.clone(),
        config: state.config.clone(),
        registry: Arc::clone(&state.exports),
    };
    tokio::spawn(job::run(ctx, requester, id, request));
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ScopeContext, ScopeSet};
    use axum::http::StatusCode;
    use std::collections::BTreeMap;

    fn requester(scopes: &str) -> Requester {
        Requester {
            token_id: 1,
            application_id: 1,
            context: ScopeContext::System,
            scopes: ScopeSet::parse(scopes),
            jurisdiction_id: 1,
            jurisdictions: BTreeMap::new(),
            actor_id: None,
            display: "client".to_string(),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_requires_respond_async() {
        let err = parse_request(&requester("system/*.read"), None, &params(&[]), String::new())
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_defaults_to_readable_types() {
        let request = parse_request(
            &requester("system/Patient.read system/Observation.read"),
            Some("respond-async"),
            &params(&[("_since", "2021-01-01T00:00:00Z")]),
            "url".to_string(),
        )
        .unwrap();
        assert_eq!(
            request.types,
            vec![ResourceType::Patient, ResourceType::Observation]
        );
        assert!(request.since.is_some());
    }

    #[test]
    fn test_parameter_errors() {
        let r = requester("system/Patient.read");
        let prefer = Some("respond-async");
        let status = |pairs: &[(&str, &str)]| {
            parse_request(&r, prefer, &params(pairs), String::new())
                .unwrap_err()
                .status
        };
        assert_eq!(status(&[("_since", "yesterday")]), StatusCode::BAD_REQUEST);
        assert_eq!(status(&[("_type", "Encounter")]), StatusCode::BAD_REQUEST);
        assert_eq!(status(&[("_outputFormat", "text/csv")]), StatusCode::BAD_REQUEST);
        assert_eq!(status(&[("_type", "Observation")]), StatusCode::FORBIDDEN);
    }
}
