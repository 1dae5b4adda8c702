//! Case-management records.
//!
//! These are the system's own shapes; the FHIR views of them live in
//! `serializer`.

pub mod jurisdiction;
pub mod oauth;
pub mod patient;
pub mod records;

pub use jurisdiction::{Jurisdiction, Transfer, User};
pub use oauth::{AccessToken, OauthApplication};
pub use patient::Patient;
pub use records::{Assessment, CloseContact, History, Laboratory, Symptom, Vaccine};
