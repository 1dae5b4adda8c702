use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::db::{Record, RecordKind};

/// Days a monitoree in the exposure workflow is followed after last exposure
pub const MONITORING_PERIOD_DAYS: i64 = 14;

/// A monitoree. The assigned jurisdiction is the record's `jurisdiction_id`
/// column rather than part of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patient {
    pub user_defined_id_statelocal: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,

    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub address_city: Option<String>,
    pub address_county: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,

    pub primary_telephone: Option<String>,
    pub secondary_telephone: Option<String>,
    pub email: Option<String>,
    pub primary_language: Option<String>,
    pub preferred_contact_method: Option<String>,
    pub preferred_contact_time: Option<String>,

    pub monitoring: bool,
    pub isolation: bool,
    pub monitoring_plan: Option<String>,
    pub assigned_user: Option<u32>,
    pub last_date_of_exposure: Option<NaiveDate>,
    pub continuous_exposure: bool,
    pub symptom_onset: Option<NaiveDate>,
    pub exposure_notes: Option<String>,

    pub date_of_departure: Option<NaiveDate>,
    pub date_of_arrival: Option<NaiveDate>,
    pub port_of_origin: Option<String>,

    pub creator_id: i64,
}

impl Record for Patient {
    const KIND: RecordKind = RecordKind::Patient;
}

/// When exposure monitoring ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfMonitoring {
    Continuous,
    On(NaiveDate),
}

impl Patient {
    pub fn end_of_monitoring(&self) -> Option<EndOfMonitoring> {
        if self.isolation {
            return None;
        }
        if self.continuous_exposure {
            return Some(EndOfMonitoring::Continuous);
        }
        self.last_date_of_exposure
            .map(|lde| EndOfMonitoring::On(lde + Duration::days(MONITORING_PERIOD_DAYS)))
    }

    /// Names of the fields that differ from `other`, sorted by name.
    pub fn changed_fields(&self, other: &Patient) -> Vec<String> {
        let (Ok(serde_json::Value::Object(a)), Ok(serde_json::Value::Object(b))) =
            (serde_json::to_value(self), serde_json::to_value(other))
        else {
            return Vec::new();
        };
        a.iter()
            .filter(|(key, value)| b.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect()
    }
}
