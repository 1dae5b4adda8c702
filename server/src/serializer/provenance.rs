use super::extensions::{self as ext, url};
use super::ResourceType;
use crate::db::Entity;
use crate::domain::History;
use crate::models::{Extension, Meta, ProvenanceAgent, ProvenanceResource, Reference};

pub fn to_fhir(entity: &Entity<History>) -> ProvenanceResource {
    let h = &entity.record;
    ProvenanceResource {
        resource_type: ResourceType::Provenance.as_str().to_string(),
        id: entity.id.to_string(),
        meta: Meta::versioned(entity.version, entity.updated_at),
        extension: vec![
            Extension::string(url(ext::HISTORY_TYPE), h.history_type.clone()),
            Extension::string(url(ext::COMMENT), h.comment.clone()),
        ],
        target: entity
            .patient_id
            .map(|id| Reference::to("Patient", id))
            .into_iter()
            .collect(),
        recorded: entity.created_at,
        agent: vec![ProvenanceAgent {
            who: Reference {
                reference: None,
                display: Some(h.created_by.clone()),
            },
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_history_as_provenance() {
        let entity = Entity {
            id: 4,
            patient_id: Some(2),
            jurisdiction_id: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            record: History::new(History::ENROLLMENT, "api-client", "Enrolled via API"),
        };
        let json = serde_json::to_value(to_fhir(&entity)).unwrap();
        assert_eq!(json["target"][0]["reference"], "Patient/2");
        assert_eq!(json["agent"][0]["who"]["display"], "api-client");
        assert_eq!(json["extension"][0]["valueString"], "Enrollment");
    }
}
