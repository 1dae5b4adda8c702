//! Custom extension URLs for fields FHIR has no element for.

use crate::models::Extension;

pub const EXTENSION_BASE: &str = "https://fhir.monitoree.org/StructureDefinition/";

pub const PREFERRED_CONTACT_METHOD: &str = "preferred-contact-method";
pub const PREFERRED_CONTACT_TIME: &str = "preferred-contact-time";
pub const SYMPTOM_ONSET_DATE: &str = "symptom-onset-date";
pub const LAST_DATE_OF_EXPOSURE: &str = "last-date-of-exposure";
pub const ISOLATION: &str = "isolation";
pub const JURISDICTION_PATH: &str = "full-assigned-jurisdiction-path";
pub const MONITORING_PLAN: &str = "monitoring-plan";
pub const ASSIGNED_USER: &str = "assigned-user";
pub const CONTINUOUS_EXPOSURE: &str = "continuous-exposure";
pub const DATE_OF_DEPARTURE: &str = "date-of-departure";
pub const DATE_OF_ARRIVAL: &str = "date-of-arrival";
pub const PORT_OF_ORIGIN: &str = "port-of-origin";
pub const EXPOSURE_NOTES: &str = "exposure-notes";
pub const END_OF_MONITORING: &str = "end-of-monitoring";
pub const CONTACT_ATTEMPTS: &str = "contact-attempts";
pub const NOTES: &str = "notes";
pub const SYMPTOMATIC: &str = "symptomatic";
pub const WHO_REPORTED: &str = "who-reported";
pub const HISTORY_TYPE: &str = "history-type";
pub const COMMENT: &str = "comment";

pub const STATE_LOCAL_ID_SYSTEM: &str = "https://fhir.monitoree.org/state-local-id";

pub fn url(name: &str) -> String {
    format!("{}{}", EXTENSION_BASE, name)
}

/// FHIRPath to the value of extension `name` under `root`.
pub fn path(root: &str, name: &str) -> String {
    format!("{}.extension('{}').value", root, url(name))
}

/// Position and value of the extension with the given short name.
pub fn find<'a>(extensions: &'a [Extension], name: &str) -> Option<(usize, &'a Extension)> {
    let full = url(name);
    extensions.iter().enumerate().find(|(_, ext)| ext.url == full)
}
