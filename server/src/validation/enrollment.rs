//! Business rules applied to every monitoree write, whether it comes from a
//! single create/update or a transaction bundle.

use chrono::NaiveDate;

use super::vocab::{self, CONTACT_METHODS, CONTACT_TIMES, MONITORING_PLANS, US_STATES};
use super::Issues;
use crate::domain::{CloseContact, Laboratory, Patient, Vaccine};
use crate::serializer::extensions::{self as ext, path};

const MAX_ASSIGNED_USER: u32 = 999_999;

fn earliest_birth_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Strips formatting from a US phone number and returns it as `+1XXXXXXXXXX`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = match digits.len() {
        10 => digits.as_str(),
        11 if digits.starts_with('1') => &digits[1..],
        _ => return None,
    };
    Some(format!("+1{}", national))
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 12
        && phone.starts_with("+1")
        && phone[2..].chars().all(|c| c.is_ascii_digit())
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn email_path(root: &str) -> String {
    format!("{}.telecom.where(system = 'email').value", root)
}

fn phone_path(root: &str, rank: u32) -> String {
    format!("{}.telecom.where(system = 'phone' and rank = {}).value", root, rank)
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

pub fn validate_patient(patient: &Patient, root: &str, today: NaiveDate, issues: &mut Issues) {
    if blank(&patient.first_name) {
        issues.business(format!("{}.name[0].given[0]", root), "First name is required");
    }
    if blank(&patient.last_name) {
        issues.business(format!("{}.name[0].family", root), "Last name is required");
    }

    let dob_path = format!("{}.birthDate", root);
    match patient.date_of_birth {
        None => issues.business(dob_path, "Date of birth is required"),
        Some(dob) if dob > today => issues.business(dob_path, "Date of birth cannot be in the future"),
        Some(dob) if dob < earliest_birth_date() => {
            issues.business(dob_path, "Date of birth cannot be before 1900-01-01")
        }
        Some(_) => {}
    }

    if let Some(state) = patient.address_state.as_deref() {
        if !US_STATES.contains(&state) {
            issues.business(
                format!("{}.address[0].state", root),
                format!("'{}' is not a valid state", state),
            );
        }
    }

    if let Some(email) = patient.email.as_deref() {
        if !is_valid_email(email) {
            issues.business(email_path(root), format!("'{}' is not a valid email address", email));
        }
    }
    for (rank, phone) in [(1, &patient.primary_telephone), (2, &patient.secondary_telephone)] {
        if let Some(phone) = phone.as_deref() {
            if !is_valid_phone(phone) {
                issues.business(
                    phone_path(root, rank),
                    format!("'{}' is not a valid 10-digit phone number", phone),
                );
            }
        }
    }

    check_vocab(
        &patient.preferred_contact_method,
        CONTACT_METHODS,
        "preferred contact method",
        path(root, ext::PREFERRED_CONTACT_METHOD),
        issues,
    );
    check_vocab(
        &patient.preferred_contact_time,
        CONTACT_TIMES,
        "preferred contact time",
        path(root, ext::PREFERRED_CONTACT_TIME),
        issues,
    );
    check_vocab(
        &patient.monitoring_plan,
        MONITORING_PLANS,
        "monitoring plan",
        path(root, ext::MONITORING_PLAN),
        issues,
    );

    match patient.preferred_contact_method.as_deref() {
        Some(vocab::CONTACT_METHOD_EMAIL) if blank(&patient.email) => issues.business(
            email_path(root),
            "Email is required when preferred contact method is 'E-mailed Web Link'",
        ),
        Some(
            method @ (vocab::CONTACT_METHOD_PHONE
            | vocab::CONTACT_METHOD_SMS
            | vocab::CONTACT_METHOD_SMS_LINK),
        ) if blank(&patient.primary_telephone) => issues.business(
            phone_path(root, 1),
            format!(
                "Primary telephone is required when preferred contact method is '{}'",
                method
            ),
        ),
        _ => {}
    }

    if let Some(user) = patient.assigned_user {
        if user == 0 || user > MAX_ASSIGNED_USER {
            issues.business(
                path(root, ext::ASSIGNED_USER),
                format!("Assigned user must be between 1 and {}", MAX_ASSIGNED_USER),
            );
        }
    }

    if patient.isolation {
        if patient.symptom_onset.is_none() {
            issues.business(
                path(root, ext::SYMPTOM_ONSET_DATE),
                "Symptom onset date is required for monitorees in isolation",
            );
        }
        if patient.continuous_exposure {
            issues.business(
                path(root, ext::CONTINUOUS_EXPOSURE),
                "Continuous exposure cannot be set for monitorees in isolation",
            );
        }
    } else if patient.last_date_of_exposure.is_none() && !patient.continuous_exposure {
        issues.business(
            path(root, ext::LAST_DATE_OF_EXPOSURE),
            "Last date of exposure is required unless continuous exposure is set",
        );
    }

    for (date, name, label) in [
        (patient.last_date_of_exposure, ext::LAST_DATE_OF_EXPOSURE, "Last date of exposure"),
        (patient.symptom_onset, ext::SYMPTOM_ONSET_DATE, "Symptom onset date"),
    ] {
        if date.is_some_and(|d| d > today) {
            issues.business(path(root, name), format!("{} cannot be in the future", label));
        }
    }

    if let (Some(departure), Some(arrival)) = (patient.date_of_departure, patient.date_of_arrival) {
        if arrival < departure {
            issues.business(
                path(root, ext::DATE_OF_ARRIVAL),
                "Date of arrival cannot be before date of departure",
            );
        }
    }
}

fn check_vocab(
    value: &Option<String>,
    allowed: &[&str],
    label: &str,
    expression: String,
    issues: &mut Issues,
) {
    if let Some(value) = value.as_deref() {
        if !allowed.contains(&value) {
            issues.business(expression, format!("'{}' is not a valid {}", value, label));
        }
    }
}

pub fn validate_laboratory(lab: &Laboratory, root: &str, today: NaiveDate, issues: &mut Issues) {
    match lab.lab_type.as_deref() {
        Some(lab_type) if vocab::reverse_lookup(vocab::LAB_TYPES, lab_type).is_some() => {}
        Some(lab_type) => issues.business(
            format!("{}.code.coding[0].code", root),
            format!("'{}' is not a supported LOINC lab code", lab_type),
        ),
        None => issues.business(format!("{}.code", root), "Lab type code is required"),
    }

    if let Some(result) = lab.result.as_deref() {
        if vocab::reverse_lookup(vocab::LAB_RESULTS, result).is_none() {
            issues.business(
                format!("{}.valueCodeableConcept.coding[0].code", root),
                format!("'{}' is not a supported SNOMED result code", result),
            );
        }
    }

    if lab.specimen_collection.is_some_and(|d| d > today) {
        issues.business(
            format!("{}.effectiveDateTime", root),
            "Specimen collection date cannot be in the future",
        );
    }
    if let (Some(collected), Some(reported)) = (lab.specimen_collection, lab.report) {
        if reported < collected {
            issues.business(
                format!("{}.issued", root),
                "Report date cannot be before specimen collection date",
            );
        }
    }
}

pub fn validate_close_contact(
    contact: &CloseContact,
    root: &str,
    today: NaiveDate,
    issues: &mut Issues,
) {
    if blank(&contact.first_name) && blank(&contact.last_name) {
        issues.business(
            format!("{}.name[0]", root),
            "Close contact requires a first or last name",
        );
    }
    if blank(&contact.primary_telephone) && blank(&contact.email) {
        issues.business(
            format!("{}.telecom", root),
            "Close contact requires a phone number or an email address",
        );
    }
    if let Some(phone) = contact.primary_telephone.as_deref() {
        if !is_valid_phone(phone) {
            issues.business(
                phone_path(root, 1),
                format!("'{}' is not a valid 10-digit phone number", phone),
            );
        }
    }
    if let Some(email) = contact.email.as_deref() {
        if !is_valid_email(email) {
            issues.business(email_path(root), format!("'{}' is not a valid email address", email));
        }
    }
    if contact.last_date_of_exposure.is_some_and(|d| d > today) {
        issues.business(
            path(root, ext::LAST_DATE_OF_EXPOSURE),
            "Last date of exposure cannot be in the future",
        );
    }
}

pub fn validate_vaccine(vaccine: &Vaccine, root: &str, today: NaiveDate, issues: &mut Issues) {
    if vocab::vaccine_by_product(&vaccine.product_name).is_none() {
        issues.business(
            format!("{}.vaccineCode.coding[0].code", root),
            format!("'{}' is not a supported CVX vaccine code", vaccine.product_name),
        );
    }
    match vaccine.administration_date {
        Some(date) if date > today => issues.business(
            format!("{}.occurrenceDateTime", root),
            "Administration date cannot be in the future",
        ),
        Some(_) => {}
        None => issues.business(
            format!("{}.occurrenceDateTime", root),
            "Administration date is required",
        ),
    }
    if let Some(dose) = vaccine.dose_number.as_deref() {
        if !vocab::DOSE_NUMBERS.contains(&dose) {
            issues.business(
                format!("{}.protocolApplied[0].doseNumberString", root),
                format!("'{}' is not a valid dose number", dose),
            );
        }
    }
}
