use super::extensions::{self as ext, url};
use super::ResourceType;
use crate::db::Entity;
use crate::domain::Assessment;
use crate::models::{
    Extension, Meta, QuestionnaireAnswer, QuestionnaireItem, QuestionnaireResponseResource,
    Reference,
};

pub fn to_fhir(entity: &Entity<Assessment>) -> QuestionnaireResponseResource {
    let a = &entity.record;
    QuestionnaireResponseResource {
        resource_type: ResourceType::QuestionnaireResponse.as_str().to_string(),
        id: entity.id.to_string(),
        meta: Meta::versioned(entity.version, entity.updated_at),
        extension: vec![
            Extension::boolean(url(ext::SYMPTOMATIC), a.symptomatic),
            Extension::string(url(ext::WHO_REPORTED), a.who_reported.clone()),
        ],
        status: "completed".to_string(),
        subject: entity
            .patient_id
            .map(|id| Reference::to("Patient", id))
            .unwrap_or_default(),
        authored: entity.created_at,
        item: a
            .symptoms
            .iter()
            .map(|s| QuestionnaireItem {
                link_id: s.name.clone(),
                text: Some(s.label.clone()),
                answer: s
                    .value
                    .map(|value| QuestionnaireAnswer {
                        value_boolean: Some(value),
                    })
                    .into_iter()
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symptom;
    use chrono::Utc;

    #[test]
    fn test_symptoms_become_items() {
        let entity = Entity {
            id: 11,
            patient_id: Some(3),
            jurisdiction_id: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            record: Assessment {
                symptomatic: true,
                who_reported: "Monitoree".to_string(),
                symptoms: vec![
                    Symptom {
                        name: "cough".to_string(),
                        label: "Cough".to_string(),
                        value: Some(true),
                    },
                    Symptom {
                        name: "fever".to_string(),
                        label: "Fever".to_string(),
                        value: None,
                    },
                ],
            },
        };

        let json = serde_json::to_value(to_fhir(&entity)).unwrap();
        assert_eq!(json["resourceType"], "QuestionnaireResponse");
        assert_eq!(json["subject"]["reference"], "Patient/3");
        assert_eq!(json["item"][0]["linkId"], "cough");
        assert_eq!(json["item"][0]["answer"][0]["valueBoolean"], true);
        assert!(json["item"][1].get("answer").is_none());
        assert_eq!(json["extension"][0]["valueBoolean"], true);
    }
}
