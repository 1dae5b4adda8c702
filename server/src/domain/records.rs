use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::{Record, RecordKind};

/// Laboratory result. Exposed as an Observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Laboratory {
    pub lab_type: Option<String>,
    pub specimen_collection: Option<NaiveDate>,
    pub report: Option<NaiveDate>,
    pub result: Option<String>,
}

impl Record for Laboratory {
    const KIND: RecordKind = RecordKind::Laboratory;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symptom {
    pub name: String,
    pub label: String,
    pub value: Option<bool>,
}

/// Symptom report. Exposed as a QuestionnaireResponse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assessment {
    pub symptomatic: bool,
    pub who_reported: String,
    pub symptoms: Vec<Symptom>,
}

impl Record for Assessment {
    const KIND: RecordKind = RecordKind::Assessment;
}

/// Person the monitoree was in contact with. Exposed as a RelatedPerson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub primary_telephone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub contact_attempts: u32,
    pub last_date_of_exposure: Option<NaiveDate>,
}

impl Record for CloseContact {
    const KIND: RecordKind = RecordKind::CloseContact;
}

/// Audit entry on a monitoree. Exposed as a Provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub created_by: String,
    pub comment: String,
    pub history_type: String,
}

impl Record for History {
    const KIND: RecordKind = RecordKind::History;
}

impl History {
    pub const ENROLLMENT: &'static str = "Enrollment";
    pub const RECORD_EDIT: &'static str = "Record Edit";
    pub const LAB_RESULT: &'static str = "Lab Result";
    pub const CONTACT: &'static str = "Close Contact";
    pub const VACCINATION: &'static str = "Vaccination";
    pub const TRANSFER: &'static str = "Monitoree Transfer";

    pub fn new(history_type: &str, created_by: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            comment: comment.into(),
            history_type: history_type.to_string(),
        }
    }
}

/// Vaccination. Exposed as an Immunization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vaccine {
    pub group_name: String,
    pub product_name: String,
    pub administration_date: Option<NaiveDate>,
    pub dose_number: Option<String>,
    pub notes: Option<String>,
}

impl Record for Vaccine {
    const KIND: RecordKind = RecordKind::Vaccine;
}
