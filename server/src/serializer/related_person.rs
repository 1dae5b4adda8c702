use super::extensions::{self as ext, url};
use super::{check_resource_type, format_date, ExtensionReader, ResourceType};
use crate::db::Entity;
use crate::domain::CloseContact;
use crate::models::{ContactPoint, Extension, HumanName, Meta, Reference, RelatedPersonResource};
use crate::validation::enrollment::normalize_phone;
use crate::validation::Issues;

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedPersonInput {
    pub contact: CloseContact,
    pub patient: Option<String>,
}

pub fn to_fhir(entity: &Entity<CloseContact>) -> RelatedPersonResource {
    let c = &entity.record;

    let mut extension = vec![Extension::unsigned_int(
        url(ext::CONTACT_ATTEMPTS),
        c.contact_attempts,
    )];
    if let Some(notes) = &c.notes {
        extension.push(Extension::string(url(ext::NOTES), notes.clone()));
    }
    if let Some(lde) = c.last_date_of_exposure {
        extension.push(Extension::date(url(ext::LAST_DATE_OF_EXPOSURE), format_date(lde)));
    }

    let name = if c.first_name.is_some() || c.last_name.is_some() {
        vec![HumanName {
            family: c.last_name.clone(),
            given: c.first_name.clone().map(|first| vec![first]),
            ..HumanName::default()
        }]
    } else {
        Vec::new()
    };

    let mut telecom = Vec::new();
    if let Some(phone) = &c.primary_telephone {
        telecom.push(ContactPoint {
            system: Some("phone".to_string()),
            value: Some(phone.clone()),
            rank: Some(1),
            ..ContactPoint::default()
        });
    }
    if let Some(email) = &c.email {
        telecom.push(ContactPoint {
            system: Some("email".to_string()),
            value: Some(email.clone()),
            ..ContactPoint::default()
        });
    }

    RelatedPersonResource {
        resource_type: ResourceType::RelatedPerson.as_str().to_string(),
        id: Some(entity.id.to_string()),
        meta: Some(Meta::versioned(entity.version, entity.updated_at)),
        extension,
        patient: entity.patient_id.map(|id| Reference::to("Patient", id)),
        name,
        telecom,
    }
}

pub fn from_fhir(
    resource: &RelatedPersonResource,
    root: &str,
    issues: &mut Issues,
) -> RelatedPersonInput {
    check_resource_type(&resource.resource_type, ResourceType::RelatedPerson, root, issues);

    let name = resource.name.first();
    let exts = ExtensionReader::new(&resource.extension, root);
    let contact = CloseContact {
        first_name: name
            .and_then(|n| n.given.as_ref())
            .and_then(|given| given.first().cloned()),
        last_name: name.and_then(|n| n.family.clone()),
        primary_telephone: resource
            .telecom
            .iter()
            .find(|t| t.system.as_deref() == Some("phone"))
            .and_then(|t| t.value.as_deref())
            .map(|raw| normalize_phone(raw).unwrap_or_else(|| raw.to_string())),
        email: resource
            .telecom
            .iter()
            .find(|t| t.system.as_deref() == Some("email"))
            .and_then(|t| t.value.clone()),
        notes: exts.string(ext::NOTES, issues),
        contact_attempts: exts.unsigned_int(ext::CONTACT_ATTEMPTS, issues).unwrap_or(0),
        last_date_of_exposure: exts.date(ext::LAST_DATE_OF_EXPOSURE, issues),
    };

    RelatedPersonInput {
        contact,
        patient: resource.patient.as_ref().and_then(|p| p.reference.clone()),
    }
}
