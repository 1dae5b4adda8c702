#![allow(dead_code)]

use std::sync::Arc;

use monitoree_fhir::config::AppConfig;
use monitoree_fhir::db::{MemoryStore, Store};
use monitoree_fhir::seed::{Seed, Seeded};
use monitoree_fhir::{build_router, AppState};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const FHIR_JSON: &str = "application/fhir+json";

/// Read/write client for `USA, State 1`.
pub const STATE1_RW: &str = "state1-rw";
/// Patient read only, same jurisdiction.
pub const STATE1_READ: &str = "state1-read";
/// Read/write client for `USA, State 2`.
pub const STATE2_RW: &str = "state2-rw";

fn seed() -> Seed {
    serde_json::from_value(json!({
        "jurisdictions": ["USA, State 1, County 1", "USA, State 2"],
        "users": [{ "email": "proxy@state1.example.com", "jurisdiction": "USA, State 1" }],
        "applications": [
            {
                "uid": "state1-app",
                "secret": "state1-secret",
                "name": "State 1 Lab System",
                "scopes": "system/*.read system/*.write",
                "jurisdiction": "USA, State 1",
                "user": "proxy@state1.example.com"
            },
            {
                "uid": "state1-reader",
                "secret": "reader-secret",
                "name": "State 1 Reader",
                "scopes": "system/Patient.read",
                "jurisdiction": "USA, State 1"
            },
            {
                "uid": "state2-app",
                "secret": "state2-secret",
                "name": "State 2 Lab System",
                "scopes": "system/*.read system/*.write",
                "jurisdiction": "USA, State 2"
            }
        ],
        "access_tokens": [
            { "token": STATE1_RW, "application": "state1-app", "scopes": "system/*.read system/*.write" },
            { "token": STATE1_READ, "application": "state1-reader", "scopes": "system/Patient.read" },
            { "token": STATE2_RW, "application": "state2-app", "scopes": "system/*.read system/*.write" }
        ]
    }))
    .expect("seed document")
}

/// In-process server on an ephemeral port backed by the memory store.
pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    pub seeded: Seeded,
    pub client: Client,
    _export_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Like `start`, with `configure` applied to the config first.
    pub async fn start_with(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let export_dir = tempfile::tempdir().expect("temp dir");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let seeded = seed().load(store.as_ref()).await.expect("seed");
        let mut config = AppConfig::in_memory(base_url.clone(), export_dir.path());
        configure(&mut config);
        let state = AppState::new(store, config);

        let app = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server");
        });

        Self {
            base_url,
            state,
            seeded,
            client: Client::new(),
            _export_dir: export_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/fhir/r4{}", self.base_url, path)
    }

    pub fn application_id(&self, uid: &str) -> i64 {
        self.seeded.applications[uid]
    }

    pub async fn get(&self, token: &str, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("GET")
    }

    pub async fn send_json(
        &self,
        method: reqwest::Method,
        token: &str,
        path: &str,
        body: &Value,
    ) -> Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
            .header("Content-Type", FHIR_JSON)
            .body(body.to_string())
            .send()
            .await
            .expect("request")
    }

    pub async fn post(&self, token: &str, path: &str, body: &Value) -> Response {
        self.send_json(reqwest::Method::POST, token, path, body).await
    }

    pub async fn put(&self, token: &str, path: &str, body: &Value) -> Response {
        self.send_json(reqwest::Method::PUT, token, path, body).await
    }

    /// Creates `patient` and returns its id.
    pub async fn create_patient(&self, token: &str, patient: &Value) -> i64 {
        let response = self.post(token, "/Patient", patient).await;
        assert_eq!(response.status(), 201, "create failed");
        let body: Value = response.json().await.expect("patient body");
        body["id"].as_str().expect("id").parse().expect("numeric id")
    }

    /// `total` of a search.
    pub async fn total(&self, token: &str, path: &str) -> u64 {
        let response = self.get(token, path).await;
        assert_eq!(response.status(), 200);
        let bundle: Value = response.json().await.expect("bundle");
        bundle["total"].as_u64().expect("total")
    }
}

pub fn extension_url(name: &str) -> String {
    format!("https://fhir.monitoree.org/StructureDefinition/{}", name)
}

pub fn patient(family: &str) -> Value {
    json!({
        "resourceType": "Patient",
        "name": [{ "family": family, "given": ["Ada"] }],
        "birthDate": "1985-04-12",
        "gender": "female",
        "telecom": [
            { "system": "phone", "value": "(555) 555-0123", "rank": 1 },
            { "system": "email", "value": "ada@example.com" }
        ],
        "address": [{ "line": ["1 Main St"], "city": "Springfield", "state": "Oregon" }],
        "extension": [
            { "url": extension_url("last-date-of-exposure"), "valueDate": "2021-05-20" },
            { "url": extension_url("preferred-contact-method"), "valueString": "E-mailed Web Link" }
        ]
    })
}

pub fn observation(subject: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "status": "final",
        "subject": { "reference": subject },
        "code": { "coding": [{ "system": "http://loinc.org", "code": "94500-6" }] },
        "effectiveDateTime": "2021-05-18",
        "issued": "2021-05-19T00:00:00Z",
        "valueCodeableConcept": {
            "coding": [{ "system": "http://snomed.info/sct", "code": "10828004" }]
        }
    })
}

/// Expressions cited by an OperationOutcome.
pub fn expressions(outcome: &Value) -> Vec<String> {
    outcome["issue"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|issue| issue["expression"].as_array().cloned().unwrap_or_default())
        .filter_map(|e| e.as_str().map(str::to_string))
        .collect()
}
