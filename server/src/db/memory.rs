use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    resolve_link, FieldFilter, MatchMode, RecordKind, RecordQuery, Store, StoreError,
    StoredRecord, Write,
};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<RecordKind, BTreeMap<i64, StoredRecord>>,
    sequences: HashMap<RecordKind, i64>,
}

/// In-process store used for local runs and tests.
///
/// A batch is staged against a copy of the touched state and only swapped in
/// once every write succeeded, all while holding the write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches_filter(record: &StoredRecord, filter: &FieldFilter) -> bool {
    let wanted = filter.value.to_lowercase();
    filter.fields.iter().any(|field| {
        let Some(text) = record.data.get(field).and_then(field_text) else {
            return false;
        };
        let text = text.to_lowercase();
        match filter.mode {
            MatchMode::Exact => text == wanted,
            MatchMode::Contains => text.contains(&wanted),
        }
    })
}

fn matches(record: &StoredRecord, query: &RecordQuery) -> bool {
    if let Some(ids) = &query.ids {
        if !ids.contains(&record.id) {
            return false;
        }
    }
    if let Some(patient_ids) = &query.patient_ids {
        match record.patient_id {
            Some(pid) if patient_ids.contains(&pid) => {}
            _ => return false,
        }
    }
    if let Some(jurisdiction_ids) = &query.jurisdiction_ids {
        match record.jurisdiction_id {
            Some(jid) if jurisdiction_ids.contains(&jid) => {}
            _ => return false,
        }
    }
    if let Some(since) = query.updated_since {
        if record.updated_at < since {
            return false;
        }
    }
    query.filters.iter().all(|f| matches_filter(record, f))
}

impl Tables {
    fn matching<'a>(&'a self, query: &'a RecordQuery) -> impl Iterator<Item = &'a StoredRecord> {
        self.records
            .get(&query.kind)
            .into_iter()
            .flat_map(|table| table.values())
            .filter(move |record| matches(record, query))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, kind: RecordKind, id: i64) -> Result<Option<StoredRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .get(&kind)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>, StoreError> {
        let tables = self.tables.read().await;
        let skip = query.offset.max(0) as usize;
        let take = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(tables
            .matching(query)
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn count(&self, query: &RecordQuery) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.matching(query).count() as i64)
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<Vec<StoredRecord>, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let mut staged: Vec<StoredRecord> = Vec::with_capacity(writes.len());
        let mut sequences = tables.sequences.clone();

        for (index, write) in writes.into_iter().enumerate() {
            let record = match write {
                Write::Insert(new) => {
                    let patient_id = resolve_link(new.patient, index, &staged)?;
                    let seq = sequences.entry(new.kind).or_insert(0);
                    *seq += 1;
                    StoredRecord {
                        kind: new.kind,
                        id: *seq,
                        patient_id,
                        jurisdiction_id: new.jurisdiction_id,
                        version: 1,
                        data: new.data,
                        created_at: now,
                        updated_at: now,
                    }
                }
                Write::Update {
                    kind,
                    id,
                    patient_id,
                    jurisdiction_id,
                    data,
                } => {
                    // Later writes in the batch see earlier updates to the same row.
                    let current = staged
                        .iter()
                        .rev()
                        .find(|r| r.kind == kind && r.id == id)
                        .or_else(|| tables.records.get(&kind).and_then(|t| t.get(&id)))
                        .ok_or(StoreError::NotFound { kind, id })?;
                    StoredRecord {
                        kind,
                        id,
                        patient_id: patient_id.or(current.patient_id),
                        jurisdiction_id: jurisdiction_id.or(current.jurisdiction_id),
                        version: current.version + 1,
                        data,
                        created_at: current.created_at,
                        updated_at: now,
                    }
                }
            };
            staged.push(record);
        }

        for record in &staged {
            tables
                .records
                .entry(record.kind)
                .or_default()
                .insert(record.id, record.clone());
        }
        tables.sequences = sequences;

        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PatientLink;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids_per_kind() {
        let store = MemoryStore::new();
        let out = store
            .apply(vec![
                Write::insert(RecordKind::Jurisdiction, json!({"name": "USA"})),
                Write::insert(RecordKind::Jurisdiction, json!({"name": "State 1"})),
                Write::insert(RecordKind::User, json!({"email": "a@example.com"})),
            ])
            .await
            .unwrap();

        assert_eq!(out[0].id, 1);
        assert_eq!(out[1].id, 2);
        assert_eq!(out[2].id, 1);
        assert_eq!(out[0].version, 1);
    }

    #[tokio::test]
    async fn test_pending_link_resolves_to_earlier_insert() {
        let store = MemoryStore::new();
        let out = store
            .apply(vec![
                Write::insert(RecordKind::Patient, json!({"first_name": "Ada"})),
                Write::insert_for_patient(
                    RecordKind::Laboratory,
                    PatientLink::Pending(0),
                    json!({"result": "positive"}),
                ),
            ])
            .await
            .unwrap();

        assert_eq!(out[1].patient_id, Some(out[0].id));
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_store_untouched() {
        let store = MemoryStore::new();
        let err = store
            .apply(vec![
                Write::insert(RecordKind::Patient, json!({"first_name": "Ada"})),
                Write::Update {
                    kind: RecordKind::Patient,
                    id: 99,
                    patient_id: None,
                    jurisdiction_id: None,
                    data: json!({}),
                },
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { id: 99, .. }));
        let count = store
            .count(&RecordQuery::new(RecordKind::Patient))
            .await
            .unwrap();
        assert_eq!(count, 0);

        // The sequence was not consumed either.
        let out = store
            .apply(vec![Write::insert(RecordKind::Patient, json!({}))])
            .await
            .unwrap();
        assert_eq!(out[0].id, 1);
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_keeps_links() {
        let store = MemoryStore::new();
        let created = store
            .apply(vec![Write::Insert(crate::db::NewRecord {
                kind: RecordKind::Patient,
                patient: None,
                jurisdiction_id: Some(3),
                data: json!({"first_name": "Ada"}),
            })])
            .await
            .unwrap();

        let updated = store
            .apply(vec![Write::Update {
                kind: RecordKind::Patient,
                id: created[0].id,
                patient_id: None,
                jurisdiction_id: None,
                data: json!({"first_name": "Grace"}),
            }])
            .await
            .unwrap();

        assert_eq!(updated[0].version, 2);
        assert_eq!(updated[0].jurisdiction_id, Some(3));
        assert_eq!(updated[0].created_at, created[0].created_at);
    }

    #[tokio::test]
    async fn test_query_filters_and_pages() {
        let store = MemoryStore::new();
        let mut writes = Vec::new();
        for (name, active) in [("Smith", true), ("Smithson", false), ("Jones", true)] {
            writes.push(Write::Insert(crate::db::NewRecord {
                kind: RecordKind::Patient,
                patient: None,
                jurisdiction_id: Some(1),
                data: json!({"last_name": name, "monitoring": active}),
            }));
        }
        store.apply(writes).await.unwrap();

        let smiths = RecordQuery::new(RecordKind::Patient).with_field_containing("last_name", "smith");
        assert_eq!(store.count(&smiths).await.unwrap(), 2);

        let active = RecordQuery::new(RecordKind::Patient).with_field("monitoring", "true");
        assert_eq!(store.count(&active).await.unwrap(), 2);

        let paged = store
            .query(&RecordQuery::new(RecordKind::Patient).page(1, 1))
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, 2);

        let elsewhere = RecordQuery::new(RecordKind::Patient).with_jurisdictions(vec![2]);
        assert_eq!(store.count(&elsewhere).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_any_field_filter_matches_either_phone() {
        let store = MemoryStore::new();
        let phones = [
            json!({"primary_telephone": "+15555550101"}),
            json!({"primary_telephone": "+15555550199", "secondary_telephone": "+15555550101"}),
            json!({"secondary_telephone": "+15555550102"}),
        ];
        let writes = phones
            .into_iter()
            .map(|data| {
                Write::Insert(crate::db::NewRecord {
                    kind: RecordKind::Patient,
                    patient: None,
                    jurisdiction_id: Some(1),
                    data,
                })
            })
            .collect();
        store.apply(writes).await.unwrap();

        let fields = ["primary_telephone", "secondary_telephone"];
        let query = RecordQuery::new(RecordKind::Patient).with_any_field(&fields, "+15555550101");
        let ids: Vec<i64> = store.query(&query).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let query = RecordQuery::new(RecordKind::Patient).with_any_field(&fields, "+15555550102");
        assert_eq!(store.count(&query).await.unwrap(), 1);
    }
}
