use std::collections::HashMap;
use std::io::ErrorKind;

use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::auth::{Access, Requester};
use crate::error::{FhirError, FhirResult};
use crate::export::{self, writer, ExportJob, ExportStatus, NDJSON};
use crate::serializer::ResourceType;
use crate::AppState;

const X_PROGRESS: HeaderName = HeaderName::from_static("x-progress");

/// `GET /fhir/r4/Patient/$export` and `GET /fhir/r4/$export`
pub async fn kick_off(
    State(state): State<AppState>,
    requester: Requester,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<HashMap<String, String>>,
) -> FhirResult<Response> {
    let prefer = headers.get("prefer").and_then(|v| v.to_str().ok());
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("");
    let url = format!("{}{}", state.config.base_url, path);
    let request = export::parse_request(&requester, prefer, &params, url)?;

    export::evict_expired(&state).await;
    let id = export::kick_off(&state, requester, request)?;
    let status_url = format!("{}/ExportStatus/{}", state.config.fhir_base(), id);
    Ok((StatusCode::ACCEPTED, [(header::CONTENT_LOCATION, status_url)]).into_response())
}

/// The job, provided it exists and belongs to the requesting application.
fn owned_job(state: &AppState, requester: &Requester, raw_id: &str) -> FhirResult<ExportJob> {
    let missing = || FhirError::not_found(format!("Export job {} not found", raw_id));
    let id = Uuid::parse_str(raw_id).map_err(|_| missing())?;
    state
        .exports
        .get(id)
        .filter(|job| job.application_id == requester.application_id)
        .ok_or_else(missing)
}

/// `GET /fhir/r4/ExportStatus/:job`
pub async fn status(
    State(state): State<AppState>,
    requester: Requester,
    Path(job_id): Path<String>,
) -> FhirResult<Response> {
    let job = owned_job(&state, &requester, &job_id)?;
    match job.status {
        ExportStatus::InProgress { progress } => {
            Ok((StatusCode::ACCEPTED, [(X_PROGRESS, progress)]).into_response())
        }
        ExportStatus::Completed(manifest) => Ok(Json(manifest).into_response()),
        ExportStatus::Failed(message) => Err(FhirError::internal_error(message)),
    }
}

/// `GET /fhir/r4/ExportFiles/:job/:type`
pub async fn file(
    State(state): State<AppState>,
    requester: Requester,
    Path((job_id, type_name)): Path<(String, String)>,
) -> FhirResult<Response> {
    let job = owned_job(&state, &requester, &job_id)?;
    if !matches!(job.status, ExportStatus::Completed(_)) {
        return Err(FhirError::not_found(format!(
            "Export job {} has no files available",
            job_id
        )));
    }
    let resource_type: ResourceType = type_name
        .parse()
        .map_err(|_| FhirError::not_found(format!("No {} file in export {}", type_name, job_id)))?;
    requester.require(resource_type, Access::Read)?;

    let path = writer::file_path(&state.config.export_dir, &job.id.to_string(), resource_type);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(FhirError::not_found(format!(
                "No {} file in export {}",
                resource_type, job_id
            )))
        }
        Err(err) => {
            tracing::error!("Failed to read export file {}: {}", path.display(), err);
            return Err(FhirError::internal_error("The export file could not be read"));
        }
    };
    Ok(([(header::CONTENT_TYPE, NDJSON)], body).into_response())
}
