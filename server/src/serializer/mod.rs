//! Conversions between domain records and their FHIR R4 representations.

pub mod extensions;
pub mod immunization;
pub mod observation;
pub mod patient;
pub mod provenance;
pub mod questionnaire_response;
pub mod related_person;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::db::RecordKind;
use crate::models::Extension;
use crate::validation::{parse_date, Issues};

/// FHIR resource types served by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Patient,
    Observation,
    QuestionnaireResponse,
    RelatedPerson,
    Provenance,
    Immunization,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Patient,
        ResourceType::Observation,
        ResourceType::QuestionnaireResponse,
        ResourceType::RelatedPerson,
        ResourceType::Provenance,
        ResourceType::Immunization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Observation => "Observation",
            ResourceType::QuestionnaireResponse => "QuestionnaireResponse",
            ResourceType::RelatedPerson => "RelatedPerson",
            ResourceType::Provenance => "Provenance",
            ResourceType::Immunization => "Immunization",
        }
    }

    pub fn record_kind(&self) -> RecordKind {
        match self {
            ResourceType::Patient => RecordKind::Patient,
            ResourceType::Observation => RecordKind::Laboratory,
            ResourceType::QuestionnaireResponse => RecordKind::Assessment,
            ResourceType::RelatedPerson => RecordKind::CloseContact,
            ResourceType::Provenance => RecordKind::History,
            ResourceType::Immunization => RecordKind::Vaccine,
        }
    }

    /// Whether create, update and patch are offered for this type.
    pub fn is_writable(&self) -> bool {
        !matches!(
            self,
            ResourceType::QuestionnaireResponse | ResourceType::Provenance
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unsupported resource type '{}'", s))
    }
}

/// Deserializes `value`, reporting a failure as a structural issue whose
/// expression is the failing JSON path under `root`.
pub fn parse<T: DeserializeOwned>(value: Value, root: &str, issues: &mut Issues) -> Option<T> {
    let result: Result<T, _> = serde_path_to_error::deserialize(value);
    match result {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let expression = if path == "." {
                root.to_string()
            } else {
                format!("{}.{}", root, path)
            };
            issues.structure(expression, err.inner().to_string());
            None
        }
    }
}

/// Reports a resourceType other than `expected`.
pub fn check_resource_type(actual: &str, expected: ResourceType, root: &str, issues: &mut Issues) {
    if actual != expected.as_str() {
        issues.structure(
            format!("{}.resourceType", root),
            format!("Expected resourceType '{}', got '{}'", expected, actual),
        );
    }
}

/// Id of a `Patient/<id>` reference, relative or absolute.
pub fn patient_reference_id(reference: &str) -> Option<i64> {
    let mut segments = reference.rsplit('/');
    let id = segments.next()?;
    match segments.next() {
        Some("Patient") => id.parse().ok(),
        _ => None,
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Typed access to the custom extensions of a resource being parsed. A known
/// extension carrying the wrong value type is a structural issue.
pub(crate) struct ExtensionReader<'a> {
    extensions: &'a [Extension],
    root: &'a str,
}

impl<'a> ExtensionReader<'a> {
    pub fn new(extensions: &'a [Extension], root: &'a str) -> Self {
        Self { extensions, root }
    }

    fn read<T>(
        &self,
        name: &str,
        value_type: &str,
        issues: &mut Issues,
        get: impl Fn(&Extension) -> Option<T>,
    ) -> Option<T> {
        let (index, extension) = extensions::find(self.extensions, name)?;
        let value = get(extension);
        if value.is_none() {
            issues.structure(
                format!("{}.extension[{}]", self.root, index),
                format!("Extension '{}' requires {}", name, value_type),
            );
        }
        value
    }

    pub fn string(&self, name: &str, issues: &mut Issues) -> Option<String> {
        self.read(name, "valueString", issues, |e| e.value_string.clone())
    }

    pub fn boolean(&self, name: &str, issues: &mut Issues) -> Option<bool> {
        self.read(name, "valueBoolean", issues, |e| e.value_boolean)
    }

    pub fn positive_int(&self, name: &str, issues: &mut Issues) -> Option<u32> {
        self.read(name, "valuePositiveInt", issues, |e| e.value_positive_int)
    }

    pub fn unsigned_int(&self, name: &str, issues: &mut Issues) -> Option<u32> {
        self.read(name, "valueUnsignedInt", issues, |e| e.value_unsigned_int)
    }

    pub fn date(&self, name: &str, issues: &mut Issues) -> Option<NaiveDate> {
        let raw = self.read(name, "valueDate", issues, |e| e.value_date.clone())?;
        let expression = || extensions::path(self.root, name);
        parse_date(Some(&raw), expression, issues)
    }
}
