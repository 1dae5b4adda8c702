//! Jurisdiction-based access to monitorees and their records.

use std::collections::BTreeMap;

use super::Requester;
use crate::db::repository::{find, find_all, find_ids};
use crate::db::{RecordKind, RecordQuery, Store, StoreError, StoredRecord};
use crate::domain::Jurisdiction;
use crate::error::{FhirError, FhirResult};
use crate::serializer::ResourceType;

/// The jurisdiction `root_id` and all of its descendants.
pub async fn subtree(
    store: &dyn Store,
    root_id: i64,
) -> Result<BTreeMap<i64, Jurisdiction>, StoreError> {
    let Some(root) = find::<Jurisdiction>(store, root_id).await? else {
        return Ok(BTreeMap::new());
    };
    let all = find_all::<Jurisdiction>(store, &RecordQuery::new(RecordKind::Jurisdiction)).await?;
    Ok(all
        .into_iter()
        .filter(|j| root.record.contains(&j.record))
        .map(|j| (j.id, j.record))
        .collect())
}

pub async fn patient_ids_in(
    store: &dyn Store,
    jurisdiction_ids: Vec<i64>,
) -> Result<Vec<i64>, StoreError> {
    find_ids(
        store,
        &RecordQuery::new(RecordKind::Patient).with_jurisdictions(jurisdiction_ids),
    )
    .await
}

/// Loads a served record: 404 when missing, 403 when its patient lies
/// outside the requester's jurisdiction.
pub async fn accessible_record(
    store: &dyn Store,
    requester: &Requester,
    resource_type: ResourceType,
    id: i64,
) -> FhirResult<StoredRecord> {
    let record = store
        .get(resource_type.record_kind(), id)
        .await?
        .ok_or_else(|| FhirError::not_found(format!("{}/{} not found", resource_type, id)))?;

    let jurisdiction_id = match (resource_type, record.patient_id) {
        (ResourceType::Patient, _) => record.jurisdiction_id,
        (_, Some(patient_id)) => store
            .get(RecordKind::Patient, patient_id)
            .await?
            .and_then(|p| p.jurisdiction_id),
        (_, None) => None,
    };
    if !requester.can_access(jurisdiction_id) {
        return Err(FhirError::forbidden(format!(
            "{}/{} is outside the requester's jurisdiction",
            resource_type, id
        )));
    }
    Ok(record)
}
