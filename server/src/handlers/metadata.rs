//! Unauthenticated discovery documents.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::FhirJson;
use crate::serializer::ResourceType;
use crate::AppState;

const SUPPORTED_SCOPES: [&str; 4] = ["system/*.read", "system/*.write", "user/*.read", "user/*.write"];

fn search_params(resource_type: ResourceType) -> Vec<Value> {
    let param = |name: &str, kind: &str| json!({ "name": name, "type": kind });
    let mut params = vec![param("_id", "token")];
    match resource_type {
        ResourceType::Patient => params.extend([
            param("family", "string"),
            param("given", "string"),
            param("telecom", "token"),
            param("email", "token"),
            param("active", "token"),
        ]),
        ResourceType::Observation => params.push(param("subject", "reference")),
        _ => params.push(param("patient", "reference")),
    }
    params
}

fn resource_entry(resource_type: ResourceType) -> Value {
    let mut interactions = vec!["read", "search-type"];
    if resource_type.is_writable() {
        interactions.extend(["create", "update", "patch"]);
    }
    let mut entry = json!({
        "type": resource_type.as_str(),
        "interaction": interactions
            .into_iter()
            .map(|code| json!({ "code": code }))
            .collect::<Vec<_>>(),
        "searchParam": search_params(resource_type),
    });
    if resource_type == ResourceType::Patient {
        entry["operation"] = json!([
            { "name": "everything", "definition": "http://hl7.org/fhir/OperationDefinition/Patient-everything" },
            { "name": "export", "definition": "http://hl7.org/fhir/uv/bulkdata/OperationDefinition/patient-export" }
        ]);
    }
    entry
}

/// `GET /fhir/r4/metadata`
pub async fn capability_statement(State(state): State<AppState>) -> FhirJson<Value> {
    let base = &state.config.base_url;
    FhirJson(json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "date": Utc::now().date_naive().to_string(),
        "kind": "instance",
        "software": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "implementation": {
            "description": "Monitoree case-management FHIR API",
            "url": state.config.fhir_base(),
        },
        "fhirVersion": "4.0.1",
        "format": ["json"],
        "rest": [{
            "mode": "server",
            "security": {
                "cors": true,
                "service": [{
                    "coding": [{
                        "system": "http://terminology.hl7.org/CodeSystem/restful-security-service",
                        "code": "SMART-on-FHIR",
                    }]
                }],
                "extension": [{
                    "url": "http://fhir-registry.smarthealthit.org/StructureDefinition/oauth-uris",
                    "extension": [
                        { "url": "token", "valueUri": format!("{}/oauth/token", base) },
                    ],
                }],
            },
            "resource": ResourceType::ALL.into_iter().map(resource_entry).collect::<Vec<_>>(),
            "interaction": [{ "code": "transaction" }],
            "operation": [{
                "name": "export",
                "definition": "http://hl7.org/fhir/uv/bulkdata/OperationDefinition/export",
            }],
        }],
    }))
}

/// `GET /.well-known/smart-configuration`
pub async fn smart_configuration(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "token_endpoint": format!("{}/oauth/token", state.config.base_url),
        "token_endpoint_auth_methods_supported": ["client_secret_post"],
        "grant_types_supported": ["client_credentials"],
        "scopes_supported": SUPPORTED_SCOPES,
        "capabilities": ["client-confidential-symmetric", "permission-v1"],
    }))
}
