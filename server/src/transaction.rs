//! Transaction Bundle processing.
//!
//! Every entry is parsed and validated before anything is written. Entries
//! may only create Patients and Observations, and an Observation's subject
//! must point at the `fullUrl` of a Patient earlier in the same bundle.
//! Accepted bundles are applied as one atomic batch.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use crate::auth::{Access, Requester};
use crate::config::AppConfig;
use crate::db::{PatientLink, Store, Write};
use crate::error::{FhirError, FhirResult};
use crate::models::{Bundle, BundleEntry, BundleResponse};
use crate::serializer::{parse, ResourceType};
use crate::services::render;
use crate::services::writes::{
    child_insert_writes, patient_insert_writes, reference_path, resolve_jurisdiction, Input,
};
use crate::validation::Issues;

const TRANSACTION_TYPES: [ResourceType; 2] = [ResourceType::Patient, ResourceType::Observation];

/// An accepted entry: its resource type and the batch position of its
/// primary write.
struct PlannedEntry {
    resource_type: ResourceType,
    write_index: usize,
}

pub async fn process(
    store: &dyn Store,
    config: &AppConfig,
    requester: &Requester,
    body: Value,
) -> FhirResult<Bundle> {
    if body.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return Err(FhirError::bad_request("Request body must be a FHIR Bundle"));
    }

    let mut issues = Issues::new();
    let Some(bundle) = parse::<Bundle>(body, "Bundle", &mut issues) else {
        return Err(FhirError::from_issues(&issues));
    };
    if bundle.bundle_type != "transaction" {
        return Err(FhirError::unprocessable_at(
            format!(
                "Bundle type '{}' is not supported; only 'transaction' is accepted",
                bundle.bundle_type
            ),
            "Bundle.type",
        ));
    }

    let today = Utc::now().date_naive();
    let mut writes: Vec<Write> = Vec::new();
    let mut planned: Vec<PlannedEntry> = Vec::new();
    // fullUrl of each accepted Patient entry → batch index of its insert
    let mut patients: HashMap<String, usize> = HashMap::new();

    for (i, entry) in bundle.entry.into_iter().enumerate() {
        let entry_path = format!("Bundle.entry[{}]", i);
        let root = format!("{}.resource", entry_path);

        let method = entry.request.as_ref().map(|r| r.method.to_ascii_uppercase());
        if method.as_deref() != Some("POST") {
            issues.business(
                format!("{}.request", entry_path),
                "Only POST requests are supported in a transaction",
            );
        }

        let Some(resource) = entry.resource else {
            issues.business(root, "Entry has no resource");
            continue;
        };
        let resource_type = match resource
            .get("resourceType")
            .and_then(Value::as_str)
            .and_then(|t| t.parse::<ResourceType>().ok())
        {
            Some(t) if TRANSACTION_TYPES.contains(&t) => t,
            _ => {
                issues.business(
                    root,
                    "Only Patient and Observation resources are supported in a transaction",
                );
                continue;
            }
        };
        requester.require(resource_type, Access::Write)?;

        let Some(input) = Input::parse(resource_type, resource, &root, &mut issues) else {
            continue;
        };
        input.validate(&root, today, &mut issues);

        let write_index = writes.len();
        match input {
            Input::Patient(patient) => {
                let jurisdiction = resolve_jurisdiction(
                    requester,
                    patient.jurisdiction_path.as_deref(),
                    requester.jurisdiction_id,
                    &root,
                    &mut issues,
                );
                let Some(jurisdiction_id) = jurisdiction else {
                    continue;
                };
                if let Some(full_url) = entry.full_url {
                    patients.insert(full_url, write_index);
                }
                writes.extend(patient_insert_writes(
                    patient,
                    requester,
                    jurisdiction_id,
                    write_index,
                )?);
            }
            child => {
                let owner = child
                    .patient_reference()
                    .and_then(|reference| patients.get(reference))
                    .copied();
                let Some(patient_index) = owner else {
                    issues.business(
                        reference_path(resource_type, &root),
                        "Reference must match the fullUrl of a Patient earlier in this Bundle",
                    );
                    continue;
                };
                writes.extend(child_insert_writes(
                    &child,
                    requester,
                    PatientLink::Pending(patient_index),
                )?);
            }
        }
        planned.push(PlannedEntry {
            resource_type,
            write_index,
        });
    }

    if !issues.is_empty() {
        tracing::info!("Transaction rejected with {} issue(s)", issues.len());
        return Err(FhirError::from_issues(&issues));
    }

    let applied = store.apply(writes).await?;

    let mut response = Bundle::new("transaction-response");
    for entry in planned {
        let Some(record) = applied.get(entry.write_index).cloned() else {
            return Err(FhirError::internal_error("Transaction result is incomplete"));
        };
        let id = record.id;
        let last_modified = record.updated_at;
        response.entry.push(BundleEntry {
            full_url: Some(config.resource_url(entry.resource_type.as_str(), id)),
            resource: Some(render(requester, entry.resource_type, record)?),
            response: Some(BundleResponse {
                status: "201 Created".to_string(),
                location: Some(format!("{}/{}", entry.resource_type, id)),
                last_modified: Some(last_modified),
            }),
            ..BundleEntry::default()
        });
    }

    tracing::info!("✓ Transaction applied: {} resources created", response.entry.len());
    Ok(response)
}
