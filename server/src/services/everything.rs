use super::render::render;
use crate::auth::{access, Access, Requester};
use crate::config::AppConfig;
use crate::db::{RecordQuery, Store, StoredRecord};
use crate::error::FhirResult;
use crate::models::Bundle;
use crate::serializer::ResourceType;

const CHILD_TYPES: [ResourceType; 5] = [
    ResourceType::Observation,
    ResourceType::QuestionnaireResponse,
    ResourceType::RelatedPerson,
    ResourceType::Immunization,
    ResourceType::Provenance,
];

/// `Patient/<id>/$everything`: the patient followed by every record the
/// requester holds read scope for.
pub async fn everything(
    store: &dyn Store,
    config: &AppConfig,
    requester: &Requester,
    patient_id: i64,
) -> FhirResult<Bundle> {
    requester.require(ResourceType::Patient, Access::Read)?;
    let patient = access::accessible_record(store, requester, ResourceType::Patient, patient_id).await?;

    let mut entries: Vec<(ResourceType, StoredRecord)> = vec![(ResourceType::Patient, patient)];
    for resource_type in CHILD_TYPES {
        if !requester.can(resource_type, Access::Read) {
            continue;
        }
        let query = RecordQuery::new(resource_type.record_kind()).with_patients(vec![patient_id]);
        entries.extend(
            store
                .query(&query)
                .await?
                .into_iter()
                .map(|record| (resource_type, record)),
        );
    }

    let mut bundle = Bundle::searchset(entries.len() as u64).with_link(
        "self",
        format!("{}/Patient/{}/$everything", config.fhir_base(), patient_id),
    );
    for (resource_type, record) in entries {
        let url = config.resource_url(resource_type.as_str(), record.id);
        bundle.push_match(url, render(requester, resource_type, record)?);
    }
    tracing::info!("✓ $everything for Patient/{}: {} resources", patient_id, bundle.entry.len());
    Ok(bundle)
}
