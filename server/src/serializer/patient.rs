use chrono::NaiveDate;

use super::extensions::{self as ext, url};
use super::{check_resource_type, format_date, ExtensionReader, ResourceType};
use crate::db::Entity;
use crate::domain::patient::EndOfMonitoring;
use crate::domain::Patient;
use crate::models::{
    Address, AdministrativeGender, CodeableConcept, Coding, ContactPoint, Extension, HumanName,
    Identifier, Meta, PatientCommunication, PatientResource,
};
use crate::validation::enrollment::normalize_phone;
use crate::validation::{parse_date, Issues};

const LANGUAGE_SYSTEM: &str = "urn:ietf:bcp:47";
const CONTINUOUS_EXPOSURE_LABEL: &str = "Continuous Exposure";

/// A parsed Patient resource. The jurisdiction travels beside the record
/// since it is stored as a column.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientInput {
    pub patient: Patient,
    pub jurisdiction_path: Option<String>,
}

pub fn to_fhir(entity: &Entity<Patient>, jurisdiction_path: Option<&str>) -> PatientResource {
    let p = &entity.record;

    let identifier = p
        .user_defined_id_statelocal
        .as_ref()
        .map(|value| Identifier {
            system: Some(ext::STATE_LOCAL_ID_SYSTEM.to_string()),
            value: Some(value.clone()),
        })
        .into_iter()
        .collect();

    let mut name = Vec::new();
    if p.first_name.is_some() || p.middle_name.is_some() || p.last_name.is_some() {
        let given: Vec<String> = p
            .first_name
            .iter()
            .chain(p.middle_name.iter())
            .cloned()
            .collect();
        name.push(HumanName {
            family: p.last_name.clone(),
            given: (!given.is_empty()).then_some(given),
            ..HumanName::default()
        });
    }

    let mut telecom = Vec::new();
    for (rank, phone) in [(1, &p.primary_telephone), (2, &p.secondary_telephone)] {
        if let Some(phone) = phone {
            telecom.push(ContactPoint {
                system: Some("phone".to_string()),
                value: Some(phone.clone()),
                rank: Some(rank),
                ..ContactPoint::default()
            });
        }
    }
    if let Some(email) = &p.email {
        telecom.push(ContactPoint {
            system: Some("email".to_string()),
            value: Some(email.clone()),
            ..ContactPoint::default()
        });
    }

    let gender = p.sex.as_deref().and_then(|sex| match sex {
        "Male" => Some(AdministrativeGender::Male),
        "Female" => Some(AdministrativeGender::Female),
        "Unknown" => Some(AdministrativeGender::Unknown),
        _ => None,
    });

    let has_address = [
        &p.address_line_1,
        &p.address_line_2,
        &p.address_city,
        &p.address_county,
        &p.address_state,
        &p.address_zip,
    ]
    .iter()
    .any(|field| field.is_some());
    let address = if has_address {
        let line: Vec<String> = p
            .address_line_1
            .iter()
            .chain(p.address_line_2.iter())
            .cloned()
            .collect();
        vec![Address {
            line: (!line.is_empty()).then_some(line),
            city: p.address_city.clone(),
            district: p.address_county.clone(),
            state: p.address_state.clone(),
            postal_code: p.address_zip.clone(),
            ..Address::default()
        }]
    } else {
        Vec::new()
    };

    let communication = p
        .primary_language
        .as_ref()
        .map(|code| PatientCommunication {
            language: CodeableConcept {
                coding: Some(vec![Coding {
                    system: Some(LANGUAGE_SYSTEM.to_string()),
                    code: Some(code.clone()),
                    display: None,
                }]),
                text: None,
            },
            preferred: Some(true),
        })
        .into_iter()
        .collect();

    PatientResource {
        resource_type: ResourceType::Patient.as_str().to_string(),
        id: Some(entity.id.to_string()),
        meta: Some(Meta::versioned(entity.version, entity.updated_at)),
        extension: extensions(p, jurisdiction_path),
        identifier,
        active: Some(p.monitoring),
        name,
        telecom,
        gender,
        birth_date: p.date_of_birth.map(format_date),
        address,
        communication,
    }
}

fn extensions(p: &Patient, jurisdiction_path: Option<&str>) -> Vec<Extension> {
    let mut out = Vec::new();
    let string = |out: &mut Vec<Extension>, name: &str, value: &Option<String>| {
        if let Some(value) = value {
            out.push(Extension::string(url(name), value.clone()));
        }
    };
    let date = |out: &mut Vec<Extension>, name: &str, value: Option<NaiveDate>| {
        if let Some(value) = value {
            out.push(Extension::date(url(name), format_date(value)));
        }
    };

    string(&mut out, ext::PREFERRED_CONTACT_METHOD, &p.preferred_contact_method);
    string(&mut out, ext::PREFERRED_CONTACT_TIME, &p.preferred_contact_time);
    date(&mut out, ext::SYMPTOM_ONSET_DATE, p.symptom_onset);
    date(&mut out, ext::LAST_DATE_OF_EXPOSURE, p.last_date_of_exposure);
    out.push(Extension::boolean(url(ext::ISOLATION), p.isolation));
    if let Some(path) = jurisdiction_path {
        out.push(Extension::string(url(ext::JURISDICTION_PATH), path));
    }
    string(&mut out, ext::MONITORING_PLAN, &p.monitoring_plan);
    if let Some(user) = p.assigned_user {
        out.push(Extension::positive_int(url(ext::ASSIGNED_USER), user));
    }
    out.push(Extension::boolean(
        url(ext::CONTINUOUS_EXPOSURE),
        p.continuous_exposure,
    ));
    date(&mut out, ext::DATE_OF_DEPARTURE, p.date_of_departure);
    date(&mut out, ext::DATE_OF_ARRIVAL, p.date_of_arrival);
    string(&mut out, ext::PORT_OF_ORIGIN, &p.port_of_origin);
    string(&mut out, ext::EXPOSURE_NOTES, &p.exposure_notes);
    match p.end_of_monitoring() {
        Some(EndOfMonitoring::Continuous) => out.push(Extension::string(
            url(ext::END_OF_MONITORING),
            CONTINUOUS_EXPOSURE_LABEL,
        )),
        Some(EndOfMonitoring::On(day)) => out.push(Extension::string(
            url(ext::END_OF_MONITORING),
            format_date(day),
        )),
        None => {}
    }
    out
}

/// Maps a Patient resource onto a monitoree record. `creator_id` is left at
/// its default for the caller to fill in.
pub fn from_fhir(resource: &PatientResource, root: &str, issues: &mut Issues) -> PatientInput {
    check_resource_type(&resource.resource_type, ResourceType::Patient, root, issues);

    let mut patient = Patient {
        monitoring: resource.active.unwrap_or(true),
        ..Patient::default()
    };

    patient.user_defined_id_statelocal = resource
        .identifier
        .iter()
        .find(|id| id.system.as_deref() == Some(ext::STATE_LOCAL_ID_SYSTEM))
        .and_then(|id| id.value.clone());

    if let Some(name) = resource.name.first() {
        let given = name.given.as_deref().unwrap_or_default();
        patient.first_name = given.first().cloned();
        patient.middle_name = given.get(1).cloned();
        patient.last_name = name.family.clone();
    }

    let mut phones: Vec<&ContactPoint> = resource
        .telecom
        .iter()
        .filter(|t| t.system.as_deref() == Some("phone"))
        .collect();
    phones.sort_by_key(|t| t.rank.unwrap_or(u32::MAX));
    let phone = |index: usize| {
        phones
            .get(index)
            .and_then(|t| t.value.as_deref())
            .map(|raw| normalize_phone(raw).unwrap_or_else(|| raw.to_string()))
    };
    patient.primary_telephone = phone(0);
    patient.secondary_telephone = phone(1);
    patient.email = resource
        .telecom
        .iter()
        .find(|t| t.system.as_deref() == Some("email"))
        .and_then(|t| t.value.clone());

    patient.sex = match resource.gender {
        Some(AdministrativeGender::Male) => Some("Male".to_string()),
        Some(AdministrativeGender::Female) => Some("Female".to_string()),
        Some(AdministrativeGender::Unknown) => Some("Unknown".to_string()),
        Some(AdministrativeGender::Other) => {
            issues.business(
                format!("{}.gender", root),
                "Gender 'other' is not supported; use male, female or unknown",
            );
            None
        }
        None => None,
    };

    patient.date_of_birth = parse_date(
        resource.birth_date.as_deref(),
        || format!("{}.birthDate", root),
        issues,
    );

    if let Some(address) = resource.address.first() {
        let lines = address.line.as_deref().unwrap_or_default();
        patient.address_line_1 = lines.first().cloned();
        patient.address_line_2 = lines.get(1).cloned();
        patient.address_city = address.city.clone();
        patient.address_county = address.district.clone();
        patient.address_state = address.state.clone();
        patient.address_zip = address.postal_code.clone();
    }

    patient.primary_language = resource.communication.first().and_then(|c| {
        c.language
            .first_code()
            .map(str::to_string)
            .or_else(|| c.language.text.clone())
    });

    let exts = ExtensionReader::new(&resource.extension, root);
    patient.preferred_contact_method = exts.string(ext::PREFERRED_CONTACT_METHOD, issues);
    patient.preferred_contact_time = exts.string(ext::PREFERRED_CONTACT_TIME, issues);
    patient.symptom_onset = exts.date(ext::SYMPTOM_ONSET_DATE, issues);
    patient.last_date_of_exposure = exts.date(ext::LAST_DATE_OF_EXPOSURE, issues);
    patient.isolation = exts.boolean(ext::ISOLATION, issues).unwrap_or(false);
    patient.monitoring_plan = exts.string(ext::MONITORING_PLAN, issues);
    patient.assigned_user = exts.positive_int(ext::ASSIGNED_USER, issues);
    patient.continuous_exposure = exts
        .boolean(ext::CONTINUOUS_EXPOSURE, issues)
        .unwrap_or(false);
    patient.date_of_departure = exts.date(ext::DATE_OF_DEPARTURE, issues);
    patient.date_of_arrival = exts.date(ext::DATE_OF_ARRIVAL, issues);
    patient.port_of_origin = exts.string(ext::PORT_OF_ORIGIN, issues);
    patient.exposure_notes = exts.string(ext::EXPOSURE_NOTES, issues);

    PatientInput {
        patient,
        jurisdiction_path: exts.string(ext::JURISDICTION_PATH, issues),
    }
}
