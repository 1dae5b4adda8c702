use chrono::NaiveDate;

use super::{check_resource_type, format_date, ResourceType};
use crate::db::Entity;
use crate::domain::Laboratory;
use crate::models::{CodeableConcept, Meta, ObservationResource, Reference};
use crate::validation::vocab::{self, LAB_RESULTS, LAB_TYPES, LOINC_SYSTEM, SNOMED_SYSTEM};
use crate::validation::{parse_date_time_as_date, Issues};

const CATEGORY_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/observation-category";

/// A parsed Observation with its raw `subject.reference`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationInput {
    pub laboratory: Laboratory,
    pub subject: Option<String>,
}

fn instant(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", format_date(date))
}

pub fn to_fhir(entity: &Entity<Laboratory>) -> ObservationResource {
    let lab = &entity.record;
    let code = lab.lab_type.as_deref().map(|lab_type| {
        match vocab::reverse_lookup(LAB_TYPES, lab_type) {
            Some(code) => CodeableConcept::coded(LOINC_SYSTEM, code, Some(lab_type)),
            None => CodeableConcept::text(lab_type),
        }
    });
    let value = lab.result.as_deref().map(|result| {
        match vocab::reverse_lookup(LAB_RESULTS, result) {
            Some(code) => CodeableConcept::coded(SNOMED_SYSTEM, code, Some(result)),
            None => CodeableConcept::text(result),
        }
    });

    ObservationResource {
        resource_type: ResourceType::Observation.as_str().to_string(),
        id: Some(entity.id.to_string()),
        meta: Some(Meta::versioned(entity.version, entity.updated_at)),
        status: Some("final".to_string()),
        category: vec![CodeableConcept::coded(
            CATEGORY_SYSTEM,
            "laboratory",
            Some("Laboratory"),
        )],
        code,
        subject: entity.patient_id.map(|id| Reference::to("Patient", id)),
        effective_date_time: lab.specimen_collection.map(format_date),
        issued: lab.report.map(instant),
        value_codeable_concept: value,
    }
}

pub fn from_fhir(resource: &ObservationResource, root: &str, issues: &mut Issues) -> ObservationInput {
    check_resource_type(&resource.resource_type, ResourceType::Observation, root, issues);

    let lab_type = resource.code.as_ref().and_then(|code| {
        code.first_code()
            .map(|c| vocab::lookup(LAB_TYPES, c).unwrap_or(c).to_string())
    });
    let result = resource.value_codeable_concept.as_ref().and_then(|value| {
        value
            .first_code()
            .map(|c| vocab::lookup(LAB_RESULTS, c).unwrap_or(c).to_string())
    });

    let laboratory = Laboratory {
        lab_type,
        specimen_collection: parse_date_time_as_date(
            resource.effective_date_time.as_deref(),
            || format!("{}.effectiveDateTime", root),
            issues,
        ),
        report: parse_date_time_as_date(
            resource.issued.as_deref(),
            || format!("{}.issued", root),
            issues,
        ),
        result,
    };

    ObservationInput {
        laboratory,
        subject: resource.subject.as_ref().and_then(|s| s.reference.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::parse;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_codes_map_to_lab_names() {
        let mut issues = Issues::new();
        let resource: ObservationResource = parse(
            json!({
                "resourceType": "Observation",
                "status": "final",
                "code": {"coding": [{"system": LOINC_SYSTEM, "code": "94558-4"}]},
                "subject": {"reference": "Patient/4"},
                "effectiveDateTime": "2021-05-01",
                "issued": "2021-05-03T12:00:00Z",
                "valueCodeableConcept": {"coding": [{"system": SNOMED_SYSTEM, "code": "260385009"}]}
            }),
            "Observation",
            &mut issues,
        )
        .unwrap();
        let input = from_fhir(&resource, "Observation", &mut issues);
        assert!(issues.is_empty());
        assert_eq!(input.laboratory.lab_type.as_deref(), Some("Antigen"));
        assert_eq!(input.laboratory.result.as_deref(), Some("negative"));
        assert_eq!(input.subject.as_deref(), Some("Patient/4"));
        assert_eq!(
            input.laboratory.report,
            NaiveDate::from_ymd_opt(2021, 5, 3)
        );
    }

    #[test]
    fn test_unknown_code_is_kept_for_validation() {
        let mut issues = Issues::new();
        let resource: ObservationResource = parse(
            json!({"resourceType": "Observation", "code": {"coding": [{"code": "1234-5"}]}}),
            "Observation",
            &mut issues,
        )
        .unwrap();
        let input = from_fhir(&resource, "Observation", &mut issues);
        assert_eq!(input.laboratory.lab_type.as_deref(), Some("1234-5"));
    }

    #[test]
    fn test_to_fhir_round_trips() {
        let lab = Laboratory {
            lab_type: Some("PCR".to_string()),
            specimen_collection: NaiveDate::from_ymd_opt(2021, 5, 1),
            report: NaiveDate::from_ymd_opt(2021, 5, 2),
            result: Some("positive".to_string()),
        };
        let entity = Entity {
            id: 9,
            patient_id: Some(4),
            jurisdiction_id: None,
            version: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            record: lab.clone(),
        };
        let resource = to_fhir(&entity);
        assert_eq!(resource.meta.as_ref().unwrap().version_id.as_deref(), Some("2"));
        assert_eq!(resource.code.as_ref().unwrap().first_code(), Some("94500-6"));

        let mut issues = Issues::new();
        let input = from_fhir(&resource, "Observation", &mut issues);
        assert!(issues.is_empty());
        assert_eq!(input.laboratory, lab);
        assert_eq!(input.subject.as_deref(), Some("Patient/4"));
    }
}
