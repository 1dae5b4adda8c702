use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Extension;
use serde_json::Value;

use super::{decode, require_media_type, resource_body, JSON_PATCH};
use crate::auth::Requester;
use crate::error::{FhirJson, FhirResult};
use crate::models::Bundle;
use crate::serializer::ResourceType;
use crate::services::{everything, resources, search};
use crate::AppState;

pub async fn read_resource(
    State(state): State<AppState>,
    Extension(resource_type): Extension<ResourceType>,
    requester: Requester,
    Path(id): Path<String>,
) -> FhirResult<FhirJson<Value>> {
    let id = resources::parse_id(resource_type, &id)?;
    let resource = resources::read(state.store.as_ref(), &requester, resource_type, id).await?;
    tracing::debug!("✓ {} read: {}", resource_type, id);
    Ok(FhirJson(resource))
}

pub async fn search_resources(
    State(state): State<AppState>,
    Extension(resource_type): Extension<ResourceType>,
    requester: Requester,
    Query(params): Query<HashMap<String, String>>,
    RawQuery(raw_query): RawQuery,
) -> FhirResult<FhirJson<Bundle>> {
    let bundle = search::search(
        state.store.as_ref(),
        &state.config,
        &requester,
        resource_type,
        &params,
        raw_query.as_deref(),
    )
    .await?;
    Ok(FhirJson(bundle))
}

pub async fn create_resource(
    State(state): State<AppState>,
    Extension(resource_type): Extension<ResourceType>,
    requester: Requester,
    headers: HeaderMap,
    body: Bytes,
) -> FhirResult<(StatusCode, [(header::HeaderName, String); 1], FhirJson<Value>)> {
    let body = resource_body(&headers, &body)?;
    let (id, resource) =
        resources::create(state.store.as_ref(), &requester, resource_type, body).await?;
    let location = state.config.resource_url(resource_type.as_str(), id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        FhirJson(resource),
    ))
}

pub async fn update_resource(
    State(state): State<AppState>,
    Extension(resource_type): Extension<ResourceType>,
    requester: Requester,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> FhirResult<FhirJson<Value>> {
    let id = resources::parse_id(resource_type, &id)?;
    let body = resource_body(&headers, &body)?;
    let resource =
        resources::update(state.store.as_ref(), &requester, resource_type, id, body).await?;
    tracing::info!("✓ {} updated: {}", resource_type, id);
    Ok(FhirJson(resource))
}

pub async fn patch_resource(
    State(state): State<AppState>,
    Extension(resource_type): Extension<ResourceType>,
    requester: Requester,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> FhirResult<FhirJson<Value>> {
    let id = resources::parse_id(resource_type, &id)?;
    require_media_type(&headers, &[JSON_PATCH])?;
    let patch: json_patch::Patch = decode(&body)?;
    let resource =
        resources::patch(state.store.as_ref(), &requester, resource_type, id, patch).await?;
    tracing::info!("✓ {} patched: {}", resource_type, id);
    Ok(FhirJson(resource))
}

pub async fn patient_everything(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
) -> FhirResult<FhirJson<Bundle>> {
    let id = resources::parse_id(ResourceType::Patient, &id)?;
    let bundle =
        everything::everything(state.store.as_ref(), &state.config, &requester, id).await?;
    Ok(FhirJson(bundle))
}
