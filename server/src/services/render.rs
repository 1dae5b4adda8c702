use serde_json::Value;

use crate::auth::Requester;
use crate::db::{Entity, StoreError, StoredRecord};
use crate::domain::Patient;
use crate::serializer::{
    immunization, observation, patient, provenance, questionnaire_response, related_person,
    ResourceType,
};

/// FHIR JSON for a stored record. Patients carry the path of their
/// jurisdiction, which is always within the requester's reach.
pub fn render(
    requester: &Requester,
    resource_type: ResourceType,
    stored: StoredRecord,
) -> Result<Value, StoreError> {
    let value = match resource_type {
        ResourceType::Patient => {
            let entity: Entity<Patient> = Entity::decode(stored)?;
            let path = requester.jurisdiction_path(entity.jurisdiction_id);
            serde_json::to_value(patient::to_fhir(&entity, path))?
        }
        ResourceType::Observation => serde_json::to_value(observation::to_fhir(&Entity::decode(stored)?))?,
        ResourceType::QuestionnaireResponse => {
            serde_json::to_value(questionnaire_response::to_fhir(&Entity::decode(stored)?))?
        }
        ResourceType::RelatedPerson => {
            serde_json::to_value(related_person::to_fhir(&Entity::decode(stored)?))?
        }
        ResourceType::Provenance => serde_json::to_value(provenance::to_fhir(&Entity::decode(stored)?))?,
        ResourceType::Immunization => {
            serde_json::to_value(immunization::to_fhir(&Entity::decode(stored)?))?
        }
    };
    Ok(value)
}
