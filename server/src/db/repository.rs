use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{RecordKind, RecordQuery, Store, StoreError, StoredRecord};

/// A domain type persisted as a record document.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const KIND: RecordKind;
}

/// A decoded record together with its store-managed columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity<T> {
    pub id: i64,
    pub patient_id: Option<i64>,
    pub jurisdiction_id: Option<i64>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record: T,
}

impl<T: Record> Entity<T> {
    pub fn decode(stored: StoredRecord) -> Result<Self, StoreError> {
        Ok(Self {
            id: stored.id,
            patient_id: stored.patient_id,
            jurisdiction_id: stored.jurisdiction_id,
            version: stored.version,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            record: serde_json::from_value(stored.data)?,
        })
    }
}

pub async fn find<T: Record>(store: &dyn Store, id: i64) -> Result<Option<Entity<T>>, StoreError> {
    store.get(T::KIND, id).await?.map(Entity::decode).transpose()
}

pub async fn find_all<T: Record>(
    store: &dyn Store,
    query: &RecordQuery,
) -> Result<Vec<Entity<T>>, StoreError> {
    debug_assert_eq!(query.kind, T::KIND);
    store
        .query(query)
        .await?
        .into_iter()
        .map(Entity::decode)
        .collect()
}

pub async fn find_one<T: Record>(
    store: &dyn Store,
    query: RecordQuery,
) -> Result<Option<Entity<T>>, StoreError> {
    Ok(find_all(store, &query.page(1, 0)).await?.into_iter().next())
}

/// Ids of every record matching `query`.
pub async fn find_ids(store: &dyn Store, query: &RecordQuery) -> Result<Vec<i64>, StoreError> {
    Ok(store.query(query).await?.into_iter().map(|r| r.id).collect())
}
