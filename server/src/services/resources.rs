//! Read, create, update and patch of single resources.

use chrono::Utc;
use serde_json::Value;

use super::render::render;
use super::writes::{
    child_insert_writes, history_write, patient_insert_writes, reference_path,
    resolve_existing_patient, resolve_jurisdiction, to_data, Input,
};
use crate::auth::{access, Access, Requester};
use crate::db::{Entity, PatientLink, RecordKind, Store, StoredRecord, Write};
use crate::domain::{History, Patient, Transfer};
use crate::error::{FhirError, FhirResult};
use crate::serializer::ResourceType;
use crate::validation::Issues;

pub fn parse_id(resource_type: ResourceType, raw: &str) -> FhirResult<i64> {
    raw.parse()
        .map_err(|_| FhirError::not_found(format!("{}/{} not found", resource_type, raw)))
}

fn ensure_writable(resource_type: ResourceType) -> FhirResult<()> {
    if resource_type.is_writable() {
        Ok(())
    } else {
        Err(FhirError::method_not_allowed(format!(
            "{} is read-only on this server",
            resource_type
        )))
    }
}

pub async fn read(
    store: &dyn Store,
    requester: &Requester,
    resource_type: ResourceType,
    id: i64,
) -> FhirResult<Value> {
    requester.require(resource_type, Access::Read)?;
    let record = access::accessible_record(store, requester, resource_type, id).await?;
    Ok(render(requester, resource_type, record)?)
}

/// Creates a resource; returns its id and FHIR representation.
pub async fn create(
    store: &dyn Store,
    requester: &Requester,
    resource_type: ResourceType,
    body: Value,
) -> FhirResult<(i64, Value)> {
    ensure_writable(resource_type)?;
    requester.require(resource_type, Access::Write)?;

    let root = resource_type.as_str();
    let mut issues = Issues::new();
    let Some(input) = Input::parse(resource_type, body, root, &mut issues) else {
        return Err(FhirError::from_issues(&issues));
    };
    input.validate(root, Utc::now().date_naive(), &mut issues);

    let writes = match input {
        Input::Patient(patient) => {
            let jurisdiction = resolve_jurisdiction(
                requester,
                patient.jurisdiction_path.as_deref(),
                requester.jurisdiction_id,
                root,
                &mut issues,
            );
            match jurisdiction {
                Some(jurisdiction_id) if issues.is_empty() => {
                    patient_insert_writes(patient, requester, jurisdiction_id, 0)?
                }
                _ => return Err(FhirError::from_issues(&issues)),
            }
        }
        child => {
            let owner = resolve_existing_patient(
                store,
                requester,
                child.patient_reference(),
                reference_path(resource_type, root),
                &mut issues,
            )
            .await?;
            match owner {
                Some(patient_id) if issues.is_empty() => {
                    child_insert_writes(&child, requester, PatientLink::Existing(patient_id))?
                }
                _ => return Err(FhirError::from_issues(&issues)),
            }
        }
    };

    let record = first_applied(store.apply(writes).await?)?;
    let id = record.id;
    let resource = render(requester, resource_type, record)?;
    tracing::info!("✓ {} created: {}", resource_type, id);
    Ok((id, resource))
}

pub async fn update(
    store: &dyn Store,
    requester: &Requester,
    resource_type: ResourceType,
    id: i64,
    body: Value,
) -> FhirResult<Value> {
    ensure_writable(resource_type)?;
    requester.require(resource_type, Access::Write)?;
    let existing = access::accessible_record(store, requester, resource_type, id).await?;
    replace(store, requester, resource_type, existing, body).await
}

pub async fn patch(
    store: &dyn Store,
    requester: &Requester,
    resource_type: ResourceType,
    id: i64,
    patch: json_patch::Patch,
) -> FhirResult<Value> {
    ensure_writable(resource_type)?;
    requester.require(resource_type, Access::Write)?;
    let existing = access::accessible_record(store, requester, resource_type, id).await?;

    let mut patched = render(requester, resource_type, existing.clone())?;
    json_patch::patch(&mut patched, &patch.0).map_err(|e| {
        FhirError::unprocessable_at(
            format!("JSON Patch could not be applied: {}", e),
            resource_type.as_str(),
        )
    })?;
    replace(store, requester, resource_type, existing, patched).await
}

/// Replaces the mapped fields of `existing` with `body`.
async fn replace(
    store: &dyn Store,
    requester: &Requester,
    resource_type: ResourceType,
    existing: StoredRecord,
    body: Value,
) -> FhirResult<Value> {
    let root = resource_type.as_str();
    if let Some(body_id) = body.get("id").and_then(Value::as_str) {
        if body_id != existing.id.to_string() {
            return Err(FhirError::structure_at(
                format!("Resource id '{}' does not match the URL id {}", body_id, existing.id),
                format!("{}.id", root),
            ));
        }
    }

    let mut issues = Issues::new();
    let Some(input) = Input::parse(resource_type, body, root, &mut issues) else {
        return Err(FhirError::from_issues(&issues));
    };
    input.validate(root, Utc::now().date_naive(), &mut issues);

    let id = existing.id;
    let writes = match input {
        Input::Patient(mut incoming) => {
            let current: Entity<Patient> = Entity::decode(existing)?;
            let current_jurisdiction = current.jurisdiction_id.unwrap_or(requester.jurisdiction_id);
            let jurisdiction = resolve_jurisdiction(
                requester,
                incoming.jurisdiction_path.as_deref(),
                current_jurisdiction,
                root,
                &mut issues,
            );
            let Some(jurisdiction_id) = jurisdiction.filter(|_| issues.is_empty()) else {
                return Err(FhirError::from_issues(&issues));
            };
            incoming.patient.creator_id = current.record.creator_id;
            patient_update_writes(
                requester,
                &current,
                incoming.patient,
                current_jurisdiction,
                jurisdiction_id,
            )?
        }
        child => {
            let owner = resolve_existing_patient(
                store,
                requester,
                child.patient_reference(),
                reference_path(resource_type, root),
                &mut issues,
            )
            .await?;
            let Some(patient_id) = owner.filter(|_| issues.is_empty()) else {
                return Err(FhirError::from_issues(&issues));
            };
            let data = child.record_data()?;
            let changed = data != existing.data || Some(patient_id) != existing.patient_id;
            let mut writes = vec![Write::Update {
                kind: child.kind(),
                id,
                patient_id: Some(patient_id),
                jurisdiction_id: None,
                data,
            }];
            if changed {
                writes.push(history_write(
                    requester,
                    PatientLink::Existing(patient_id),
                    History::RECORD_EDIT,
                    format!("{} edited via API.", child.edited_label()),
                )?);
            }
            writes
        }
    };

    let record = first_applied(store.apply(writes).await?)?;
    tracing::info!("✓ {} updated: {} (version {})", resource_type, id, record.version);
    Ok(render(requester, resource_type, record)?)
}

fn patient_update_writes(
    requester: &Requester,
    current: &Entity<Patient>,
    updated: Patient,
    from_jurisdiction: i64,
    to_jurisdiction: i64,
) -> FhirResult<Vec<Write>> {
    let id = current.id;
    let changed = updated.changed_fields(&current.record);
    let mut writes = vec![Write::Update {
        kind: RecordKind::Patient,
        id,
        patient_id: None,
        jurisdiction_id: Some(to_jurisdiction),
        data: to_data(&updated)?,
    }];

    if from_jurisdiction != to_jurisdiction {
        let transfer = Transfer {
            from_jurisdiction_id: from_jurisdiction,
            to_jurisdiction_id: to_jurisdiction,
            who_id: requester.actor_id.unwrap_or_default(),
        };
        writes.push(Write::insert_for_patient(
            RecordKind::Transfer,
            PatientLink::Existing(id),
            to_data(&transfer)?,
        ));
        let comment = format!(
            "Monitoree transferred from '{}' to '{}' via API.",
            requester.jurisdiction_path(Some(from_jurisdiction)).unwrap_or("unknown"),
            requester.jurisdiction_path(Some(to_jurisdiction)).unwrap_or("unknown"),
        );
        writes.push(history_write(
            requester,
            PatientLink::Existing(id),
            History::TRANSFER,
            comment,
        )?);
        tracing::info!(
            patient = id,
            from = from_jurisdiction,
            to = to_jurisdiction,
            "Monitoree transferred"
        );
    }

    if !changed.is_empty() {
        writes.push(history_write(
            requester,
            PatientLink::Existing(id),
            History::RECORD_EDIT,
            format!(
                "Monitoree record edited via API. Changed fields: {}.",
                changed.join(", ")
            ),
        )?);
    }
    Ok(writes)
}

fn first_applied(applied: Vec<StoredRecord>) -> FhirResult<StoredRecord> {
    applied
        .into_iter()
        .next()
        .ok_or_else(|| FhirError::internal_error("Write produced no record"))
}
