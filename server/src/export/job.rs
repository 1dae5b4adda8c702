use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::registry::{ExportManifest, ExportRegistry, ManifestOutput};
use super::writer::{file_path, write_ndjson};
use super::ExportError;
use crate::auth::Requester;
use crate::config::AppConfig;
use crate::db::{RecordQuery, Store};
use crate::serializer::ResourceType;
use crate::services::render;

/// What a kick-off request asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub types: Vec<ResourceType>,
    pub since: Option<DateTime<Utc>>,
    /// Full kick-off URL, echoed in the manifest
    pub url: String,
}

/// Everything a background export needs, detached from the request.
pub struct ExportContext {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub registry: Arc<ExportRegistry>,
}

/// Runs job `id` to completion and records the outcome in the registry.
pub async fn run(ctx: ExportContext, requester: Requester, id: Uuid, request: ExportRequest) {
    tracing::info!("Export {} started for application {}", id, requester.application_id);
    match export_all(&ctx, &requester, id, &request).await {
        Ok(manifest) => {
            let files = manifest.output.len();
            ctx.registry.complete(id, manifest);
            tracing::info!("✓ Export {} completed: {} files", id, files);
        }
        Err(err) => {
            tracing::error!("Export {} failed: {}", id, err);
            ctx.registry.fail(id, "The export could not be completed");
        }
    }
}

async fn export_all(
    ctx: &ExportContext,
    requester: &Requester,
    id: Uuid,
    request: &ExportRequest,
) -> Result<ExportManifest, ExportError> {
    let transaction_time = ctx
        .registry
        .get(id)
        .map(|job| job.started_at)
        .unwrap_or_else(Utc::now);
    let job = id.to_string();
    let patient_ids = requester.accessible_patient_ids(ctx.store.as_ref()).await?;

    let mut output = Vec::new();
    for (n, resource_type) in request.types.iter().copied().enumerate() {
        ctx.registry.set_progress(
            id,
            format!(
                "Exporting {} ({} of {})",
                resource_type,
                n + 1,
                request.types.len()
            ),
        );

        let mut query = RecordQuery::new(resource_type.record_kind());
        query = match resource_type {
            ResourceType::Patient => query.with_jurisdictions(requester.jurisdiction_ids()),
            _ => query.with_patients(patient_ids.clone()),
        };
        if let Some(since) = request.since {
            query = query.updated_since(since);
        }

        let resources = ctx
            .store
            .query(&query)
            .await?
            .into_iter()
            .map(|record| render(requester, resource_type, record))
            .collect::<Result<Vec<_>, _>>()?;

        let path = file_path(&ctx.config.export_dir, &job, resource_type);
        let count = write_ndjson(&path, &resources).await?;
        output.push(ManifestOutput {
            resource_type: resource_type.to_string(),
            url: format!("{}/ExportFiles/{}/{}", ctx.config.fhir_base(), job, resource_type),
            count,
        });
    }

    Ok(ExportManifest {
        transaction_time,
        request: request.url.clone(),
        requires_access_token: true,
        output,
        error: Vec::new(),
    })
}
