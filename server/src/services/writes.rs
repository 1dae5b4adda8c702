//! Parsing, validation and write planning shared by single-resource
//! interactions and transaction bundles.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::auth::Requester;
use crate::db::repository::find;
use crate::db::{NewRecord, PatientLink, RecordKind, Store, StoreError, Write};
use crate::domain::{History, Patient};
use crate::models::{ImmunizationResource, ObservationResource, PatientResource, RelatedPersonResource};
use crate::serializer::extensions::{self as ext};
use crate::serializer::immunization::{self, ImmunizationInput};
use crate::serializer::observation::{self, ObservationInput};
use crate::serializer::patient::{self, PatientInput};
use crate::serializer::related_person::{self, RelatedPersonInput};
use crate::serializer::{parse, patient_reference_id, ResourceType};
use crate::validation::enrollment;
use crate::validation::Issues;

/// A writable resource mapped onto its domain record.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Patient(PatientInput),
    Observation(ObservationInput),
    RelatedPerson(RelatedPersonInput),
    Immunization(ImmunizationInput),
}

impl Input {
    /// Deserializes and maps `value`. Returns `None` when the JSON does not
    /// fit the resource structure at all; problems are added to `issues`.
    pub fn parse(
        resource_type: ResourceType,
        value: Value,
        root: &str,
        issues: &mut Issues,
    ) -> Option<Self> {
        let input = match resource_type {
            ResourceType::Patient => {
                let resource: PatientResource = parse(value, root, issues)?;
                Input::Patient(patient::from_fhir(&resource, root, issues))
            }
            ResourceType::Observation => {
                let resource: ObservationResource = parse(value, root, issues)?;
                Input::Observation(observation::from_fhir(&resource, root, issues))
            }
            ResourceType::RelatedPerson => {
                let resource: RelatedPersonResource = parse(value, root, issues)?;
                Input::RelatedPerson(related_person::from_fhir(&resource, root, issues))
            }
            ResourceType::Immunization => {
                let resource: ImmunizationResource = parse(value, root, issues)?;
                Input::Immunization(immunization::from_fhir(&resource, root, issues))
            }
            ResourceType::QuestionnaireResponse | ResourceType::Provenance => {
                issues.structure(
                    root.to_string(),
                    format!("{} cannot be written", resource_type),
                );
                return None;
            }
        };
        Some(input)
    }

    /// Raw patient reference of a child resource.
    pub fn patient_reference(&self) -> Option<&str> {
        match self {
            Input::Patient(_) => None,
            Input::Observation(o) => o.subject.as_deref(),
            Input::RelatedPerson(r) => r.patient.as_deref(),
            Input::Immunization(i) => i.patient.as_deref(),
        }
    }

    pub fn validate(&self, root: &str, today: NaiveDate, issues: &mut Issues) {
        match self {
            Input::Patient(p) => enrollment::validate_patient(&p.patient, root, today, issues),
            Input::Observation(o) => {
                enrollment::validate_laboratory(&o.laboratory, root, today, issues)
            }
            Input::RelatedPerson(r) => {
                enrollment::validate_close_contact(&r.contact, root, today, issues)
            }
            Input::Immunization(i) => enrollment::validate_vaccine(&i.vaccine, root, today, issues),
        }
    }

    /// The record document to store.
    pub fn record_data(&self) -> Result<Value, StoreError> {
        Ok(match self {
            Input::Patient(p) => serde_json::to_value(&p.patient)?,
            Input::Observation(o) => serde_json::to_value(&o.laboratory)?,
            Input::RelatedPerson(r) => serde_json::to_value(&r.contact)?,
            Input::Immunization(i) => serde_json::to_value(&i.vaccine)?,
        })
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Input::Patient(_) => RecordKind::Patient,
            Input::Observation(_) => RecordKind::Laboratory,
            Input::RelatedPerson(_) => RecordKind::CloseContact,
            Input::Immunization(_) => RecordKind::Vaccine,
        }
    }

    fn created_history(&self) -> (&'static str, &'static str) {
        match self {
            Input::Patient(_) => (History::ENROLLMENT, "Monitoree enrolled via API."),
            Input::Observation(_) => (History::LAB_RESULT, "Lab result added via API."),
            Input::RelatedPerson(_) => (History::CONTACT, "Close contact added via API."),
            Input::Immunization(_) => (History::VACCINATION, "Vaccination added via API."),
        }
    }

    pub fn edited_label(&self) -> &'static str {
        match self {
            Input::Patient(_) => "Monitoree record",
            Input::Observation(_) => "Lab result",
            Input::RelatedPerson(_) => "Close contact",
            Input::Immunization(_) => "Vaccination",
        }
    }
}

/// FHIRPath of the patient reference element of a child resource.
pub fn reference_path(resource_type: ResourceType, root: &str) -> String {
    match resource_type {
        ResourceType::Observation => format!("{}.subject.reference", root),
        _ => format!("{}.patient.reference", root),
    }
}

/// Jurisdiction named by a Patient's `full-assigned-jurisdiction-path`,
/// or `default` when the extension is absent.
pub fn resolve_jurisdiction(
    requester: &Requester,
    path: Option<&str>,
    default: i64,
    root: &str,
    issues: &mut Issues,
) -> Option<i64> {
    let Some(path) = path else {
        return Some(default);
    };
    let found = requester.jurisdiction_by_path(path);
    if found.is_none() {
        issues.business(
            ext::path(root, ext::JURISDICTION_PATH),
            format!(
                "Jurisdiction '{}' does not exist or is outside the requester's jurisdiction",
                path
            ),
        );
    }
    found
}

/// Resolves a reference to an already stored patient the requester can see.
pub async fn resolve_existing_patient(
    store: &dyn Store,
    requester: &Requester,
    reference: Option<&str>,
    expression: String,
    issues: &mut Issues,
) -> Result<Option<i64>, StoreError> {
    let Some(reference) = reference else {
        issues.business(expression, "A Patient reference is required");
        return Ok(None);
    };
    let Some(id) = patient_reference_id(reference) else {
        issues.business(
            expression,
            format!("'{}' is not a reference to a Patient", reference),
        );
        return Ok(None);
    };
    match find::<Patient>(store, id).await? {
        Some(patient) if requester.can_access(patient.jurisdiction_id) => Ok(Some(id)),
        _ => {
            issues.business(
                expression,
                format!("Patient/{} does not exist or is not accessible", id),
            );
            Ok(None)
        }
    }
}

pub fn history_write(
    requester: &Requester,
    patient: PatientLink,
    history_type: &str,
    comment: impl Into<String>,
) -> Result<Write, StoreError> {
    let history = History::new(history_type, requester.display.clone(), comment);
    Ok(Write::insert_for_patient(
        RecordKind::History,
        patient,
        to_data(&history)?,
    ))
}

pub fn to_data<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(record)?)
}

/// Writes enrolling a new patient and its history entry. `index` is the
/// position the patient insert will have in the batch.
pub fn patient_insert_writes(
    mut input: PatientInput,
    requester: &Requester,
    jurisdiction_id: i64,
    index: usize,
) -> Result<Vec<Write>, StoreError> {
    input.patient.creator_id = requester.actor_id.unwrap_or_default();
    Ok(vec![
        Write::Insert(NewRecord {
            kind: RecordKind::Patient,
            patient: None,
            jurisdiction_id: Some(jurisdiction_id),
            data: to_data(&input.patient)?,
        }),
        history_write(
            requester,
            PatientLink::Pending(index),
            History::ENROLLMENT,
            "Monitoree enrolled via API.",
        )?,
    ])
}

/// Writes creating a child record of `owner` and its history entry.
pub fn child_insert_writes(
    input: &Input,
    requester: &Requester,
    owner: PatientLink,
) -> Result<Vec<Write>, StoreError> {
    let (history_type, comment) = input.created_history();
    Ok(vec![
        Write::insert_for_patient(input.kind(), owner, input.record_data()?),
        history_write(requester, owner, history_type, comment)?,
    ])
}
