//! Record storage.
//!
//! Every domain object is persisted as a JSON document keyed by
//! `(kind, id)`. The owning patient and the jurisdiction are kept outside
//! the document so that scoping queries never have to look inside it.

pub mod config;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod repository;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub use config::DbConfig;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{Entity, Record};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: i64 },

    #[error("write {index} links to write {target}, which is not an earlier insert")]
    DanglingLink { index: usize, target: usize },

    #[error("unknown record kind '{0}'")]
    UnknownKind(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Jurisdiction,
    User,
    OauthApplication,
    AccessToken,
    Patient,
    Laboratory,
    Assessment,
    CloseContact,
    History,
    Vaccine,
    Transfer,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Jurisdiction => "jurisdiction",
            RecordKind::User => "user",
            RecordKind::OauthApplication => "oauth_application",
            RecordKind::AccessToken => "access_token",
            RecordKind::Patient => "patient",
            RecordKind::Laboratory => "laboratory",
            RecordKind::Assessment => "assessment",
            RecordKind::CloseContact => "close_contact",
            RecordKind::History => "history",
            RecordKind::Vaccine => "vaccine",
            RecordKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "jurisdiction" => RecordKind::Jurisdiction,
            "user" => RecordKind::User,
            "oauth_application" => RecordKind::OauthApplication,
            "access_token" => RecordKind::AccessToken,
            "patient" => RecordKind::Patient,
            "laboratory" => RecordKind::Laboratory,
            "assessment" => RecordKind::Assessment,
            "close_contact" => RecordKind::CloseContact,
            "history" => RecordKind::History,
            "vaccine" => RecordKind::Vaccine,
            "transfer" => RecordKind::Transfer,
            other => return Err(StoreError::UnknownKind(other.to_string())),
        })
    }
}

/// A persisted record as the store sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub kind: RecordKind,
    pub id: i64,
    pub patient_id: Option<i64>,
    pub jurisdiction_id: Option<i64>,
    pub version: i32,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owning patient of a record being inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientLink {
    Existing(i64),
    /// Index of an earlier insert in the same batch whose assigned id becomes
    /// the patient id.
    Pending(usize),
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub kind: RecordKind,
    pub patient: Option<PatientLink>,
    pub jurisdiction_id: Option<i64>,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub enum Write {
    Insert(NewRecord),
    Update {
        kind: RecordKind,
        id: i64,
        patient_id: Option<i64>,
        jurisdiction_id: Option<i64>,
        data: Value,
    },
}

impl Write {
    pub fn insert(kind: RecordKind, data: Value) -> Self {
        Write::Insert(NewRecord {
            kind,
            patient: None,
            jurisdiction_id: None,
            data,
        })
    }

    pub fn insert_for_patient(kind: RecordKind, patient: PatientLink, data: Value) -> Self {
        Write::Insert(NewRecord {
            kind,
            patient: Some(patient),
            jurisdiction_id: None,
            data,
        })
    }
}

/// Resolves the patient id of write `index` against the records already
/// produced by the batch.
pub(crate) fn resolve_link(
    link: Option<PatientLink>,
    index: usize,
    applied: &[StoredRecord],
) -> Result<Option<i64>, StoreError> {
    match link {
        None => Ok(None),
        Some(PatientLink::Existing(id)) => Ok(Some(id)),
        Some(PatientLink::Pending(target)) => {
            if target >= index {
                return Err(StoreError::DanglingLink { index, target });
            }
            Ok(Some(applied[target].id))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Case-insensitive equality.
    Exact,
    /// Case-insensitive substring.
    Contains,
}

/// Filter on top-level fields of the record document, satisfied when any
/// of `fields` matches. Non-string JSON values are compared by their
/// textual form (`true`, `42`).
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub fields: Vec<String>,
    pub value: String,
    pub mode: MatchMode,
}

#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub kind: RecordKind,
    pub ids: Option<Vec<i64>>,
    pub patient_ids: Option<Vec<i64>>,
    pub jurisdiction_ids: Option<Vec<i64>>,
    pub updated_since: Option<DateTime<Utc>>,
    pub filters: Vec<FieldFilter>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl RecordQuery {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            ids: None,
            patient_ids: None,
            jurisdiction_ids: None,
            updated_since: None,
            filters: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn with_ids(mut self, ids: Vec<i64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_patients(mut self, patient_ids: Vec<i64>) -> Self {
        self.patient_ids = Some(patient_ids);
        self
    }

    pub fn with_jurisdictions(mut self, jurisdiction_ids: Vec<i64>) -> Self {
        self.jurisdiction_ids = Some(jurisdiction_ids);
        self
    }

    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FieldFilter {
            fields: vec![field.into()],
            value: value.into(),
            mode: MatchMode::Exact,
        });
        self
    }

    /// Exact match on whichever of `fields` holds the value.
    pub fn with_any_field(mut self, fields: &[&str], value: impl Into<String>) -> Self {
        self.filters.push(FieldFilter {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            value: value.into(),
            mode: MatchMode::Exact,
        });
        self
    }

    pub fn with_field_containing(
        mut self,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.filters.push(FieldFilter {
            fields: vec![field.into()],
            value: value.into(),
            mode: MatchMode::Contains,
        });
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// Backend-agnostic record store.
///
/// `apply` is the only write path and is atomic: either every write in the
/// batch lands or none does. Queries return records ordered by id.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, kind: RecordKind, id: i64) -> Result<Option<StoredRecord>, StoreError>;

    async fn query(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>, StoreError>;

    /// Number of records matching `query`, ignoring its paging.
    async fn count(&self, query: &RecordQuery) -> Result<i64, StoreError>;

    async fn apply(&self, writes: Vec<Write>) -> Result<Vec<StoredRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_round_trips_through_str() {
        for kind in [
            RecordKind::Jurisdiction,
            RecordKind::AccessToken,
            RecordKind::Patient,
            RecordKind::CloseContact,
            RecordKind::Transfer,
        ] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("monitoree".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_resolve_link_rejects_forward_reference() {
        let err = resolve_link(Some(PatientLink::Pending(2)), 1, &[]).unwrap_err();
        assert!(matches!(err, StoreError::DanglingLink { index: 1, target: 2 }));
        assert_eq!(
            resolve_link(Some(PatientLink::Existing(7)), 0, &[]).unwrap(),
            Some(7)
        );
    }
}
