use super::{check_resource_type, format_date, ResourceType};
use crate::db::Entity;
use crate::domain::Vaccine;
use crate::models::{Annotation, CodeableConcept, ImmunizationResource, Meta, ProtocolApplied, Reference};
use crate::validation::vocab::{self, CVX_SYSTEM};
use crate::validation::{parse_date_time_as_date, Issues};

#[derive(Debug, Clone, PartialEq)]
pub struct ImmunizationInput {
    pub vaccine: Vaccine,
    pub patient: Option<String>,
}

pub fn to_fhir(entity: &Entity<Vaccine>) -> ImmunizationResource {
    let v = &entity.record;
    let vaccine_code = match vocab::vaccine_by_product(&v.product_name) {
        Some(product) => CodeableConcept::coded(CVX_SYSTEM, product.cvx, Some(product.product)),
        None => CodeableConcept::text(v.product_name.clone()),
    };

    let protocol_applied = if v.group_name.is_empty() && v.dose_number.is_none() {
        Vec::new()
    } else {
        vec![ProtocolApplied {
            target_disease: if v.group_name.is_empty() {
                Vec::new()
            } else {
                vec![CodeableConcept::text(v.group_name.clone())]
            },
            dose_number_string: v.dose_number.clone(),
        }]
    };

    ImmunizationResource {
        resource_type: ResourceType::Immunization.as_str().to_string(),
        id: Some(entity.id.to_string()),
        meta: Some(Meta::versioned(entity.version, entity.updated_at)),
        status: Some("completed".to_string()),
        vaccine_code: Some(vaccine_code),
        patient: entity.patient_id.map(|id| Reference::to("Patient", id)),
        occurrence_date_time: v.administration_date.map(format_date),
        note: v
            .notes
            .iter()
            .map(|text| Annotation { text: text.clone() })
            .collect(),
        protocol_applied,
    }
}

/// Product and group are derived from the CVX code; an unknown code is kept
/// verbatim as the product so validation can report it.
pub fn from_fhir(resource: &ImmunizationResource, root: &str, issues: &mut Issues) -> ImmunizationInput {
    check_resource_type(&resource.resource_type, ResourceType::Immunization, root, issues);

    let code = resource
        .vaccine_code
        .as_ref()
        .and_then(|c| c.first_code().map(str::to_string).or_else(|| c.text.clone()))
        .unwrap_or_default();
    let (group_name, product_name) = match vocab::vaccine_by_cvx(&code) {
        Some(product) => (product.group.to_string(), product.product.to_string()),
        None => (String::new(), code),
    };

    let vaccine = Vaccine {
        group_name,
        product_name,
        administration_date: parse_date_time_as_date(
            resource.occurrence_date_time.as_deref(),
            || format!("{}.occurrenceDateTime", root),
            issues,
        ),
        dose_number: resource
            .protocol_applied
            .first()
            .and_then(|p| p.dose_number_string.clone()),
        notes: resource.note.first().map(|n| n.text.clone()),
    };

    ImmunizationInput {
        vaccine,
        patient: resource.patient.as_ref().and_then(|p| p.reference.clone()),
    }
}
