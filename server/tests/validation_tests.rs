mod common;

use common::{expressions, extension_url, patient, TestServer, STATE1_RW};
use serde_json::{json, Value};

fn with_extensions(mut resource: Value, extensions: &[Value]) -> Value {
    resource["extension"]
        .as_array_mut()
        .unwrap()
        .extend(extensions.iter().cloned());
    resource
}

fn expression(name: &str) -> String {
    format!("Patient.extension('{}').value", extension_url(name))
}

async fn rejected(server: &TestServer, resource: &Value) -> Vec<String> {
    let response = server.post(STATE1_RW, "/Patient", resource).await;
    assert_eq!(response.status(), 422);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["code"], "business-rule");
    expressions(&outcome)
}

#[tokio::test]
async fn test_assigned_user_must_be_in_range() {
    let server = TestServer::start().await;

    for user in [0, 1_000_000] {
        let resource = with_extensions(
            patient("Lovelace"),
            &[json!({ "url": extension_url("assigned-user"), "valuePositiveInt": user })],
        );
        assert_eq!(
            rejected(&server, &resource).await,
            vec![expression("assigned-user")]
        );
    }

    let resource = with_extensions(
        patient("Lovelace"),
        &[json!({ "url": extension_url("assigned-user"), "valuePositiveInt": 999_999 })],
    );
    let response = server.post(STATE1_RW, "/Patient", &resource).await;
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_isolation_excludes_continuous_exposure() {
    let server = TestServer::start().await;
    let resource = with_extensions(
        patient("Lovelace"),
        &[
            json!({ "url": extension_url("isolation"), "valueBoolean": true }),
            json!({ "url": extension_url("symptom-onset-date"), "valueDate": "2021-05-18" }),
            json!({ "url": extension_url("continuous-exposure"), "valueBoolean": true }),
        ],
    );
    assert_eq!(
        rejected(&server, &resource).await,
        vec![expression("continuous-exposure")]
    );
}

#[tokio::test]
async fn test_arrival_cannot_precede_departure() {
    let server = TestServer::start().await;
    let resource = with_extensions(
        patient("Lovelace"),
        &[
            json!({ "url": extension_url("date-of-departure"), "valueDate": "2021-05-10" }),
            json!({ "url": extension_url("date-of-arrival"), "valueDate": "2021-05-01" }),
        ],
    );
    assert_eq!(
        rejected(&server, &resource).await,
        vec![expression("date-of-arrival")]
    );

    let resource = with_extensions(
        patient("Lovelace"),
        &[
            json!({ "url": extension_url("date-of-departure"), "valueDate": "2021-05-01" }),
            json!({ "url": extension_url("date-of-arrival"), "valueDate": "2021-05-01" }),
        ],
    );
    let response = server.post(STATE1_RW, "/Patient", &resource).await;
    assert_eq!(response.status(), 201);
}
