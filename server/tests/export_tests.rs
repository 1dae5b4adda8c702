mod common;

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use common::{patient, TestServer, STATE1_READ, STATE1_RW};
use serde_json::Value;

async fn kick_off(server: &TestServer, token: &str, query: &str) -> reqwest::Response {
    server
        .client
        .get(server.url(&format!("/Patient/$export{}", query)))
        .bearer_auth(token)
        .header("Prefer", "respond-async")
        .send()
        .await
        .unwrap()
}

/// Polls the status URL until the manifest is ready.
async fn manifest(server: &TestServer, status_url: &str) -> Value {
    for _ in 0..100 {
        let response = server
            .client
            .get(status_url)
            .bearer_auth(STATE1_RW)
            .send()
            .await
            .unwrap();
        if response.status() == 200 {
            return response.json().await.unwrap();
        }
        assert_eq!(response.status(), 202);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("export did not complete");
}

fn status_url(response: &reqwest::Response) -> String {
    response.headers()["content-location"]
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_export_runs_to_completion() {
    let server = TestServer::start().await;
    server.create_patient(STATE1_RW, &patient("Lovelace")).await;
    server.create_patient(STATE1_RW, &patient("Hopper")).await;

    let response = kick_off(&server, STATE1_RW, "?_type=Patient,Provenance").await;
    assert_eq!(response.status(), 202);
    let status_url = response.headers()["content-location"]
        .to_str()
        .unwrap()
        .to_string();

    let mut manifest = None;
    for _ in 0..100 {
        let response = server
            .client
            .get(&status_url)
            .bearer_auth(STATE1_RW)
            .send()
            .await
            .unwrap();
        if response.status() == 200 {
            manifest = Some(response.json::<Value>().await.unwrap());
            break;
        }
        assert_eq!(response.status(), 202);
        assert!(response.headers().contains_key("x-progress"));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let manifest = manifest.expect("export did not complete");
    assert_eq!(manifest["requiresAccessToken"], true);
    let output = manifest["output"].as_array().unwrap();
    assert_eq!(output.len(), 2);
    assert_eq!(output[0]["type"], "Patient");
    assert_eq!(output[0]["count"], 2);

    let response = server
        .client
        .get(output[0]["url"].as_str().unwrap())
        .bearer_auth(STATE1_RW)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/fhir+ndjson"
    );
    let body = response.text().await.unwrap();
    assert_eq!(body.lines().count(), 2);

    // another application cannot see the job
    let response = server
        .client
        .get(&status_url)
        .bearer_auth(STATE1_READ)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_second_export_is_throttled() {
    let server = TestServer::start().await;
    server
        .state
        .exports
        .start(server.application_id("state1-app"), "earlier".to_string())
        .unwrap();

    let response = kick_off(&server, STATE1_RW, "").await;
    assert_eq!(response.status(), 429);
    let outcome: Value = response.json().await.unwrap();
    assert!(outcome["issue"][0]["diagnostics"]
        .as_str()
        .unwrap()
        .contains("already initiated an export"));

    // other applications are unaffected
    let response = kick_off(&server, STATE1_READ, "").await;
    assert_eq!(response.status(), 202);
}

#[tokio::test]
async fn test_kick_off_parameter_errors() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/Patient/$export"))
        .bearer_auth(STATE1_RW)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    assert_eq!(kick_off(&server, STATE1_RW, "?_since=yesterday").await.status(), 400);
    assert_eq!(kick_off(&server, STATE1_RW, "?_type=Encounter").await.status(), 400);
    assert_eq!(
        kick_off(&server, STATE1_READ, "?_type=Observation").await.status(),
        403
    );
}

#[tokio::test]
async fn test_since_limits_export_to_recent_changes() {
    let server = TestServer::start().await;
    server.create_patient(STATE1_RW, &patient("Lovelace")).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let since = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.create_patient(STATE1_RW, &patient("Hopper")).await;

    let response = kick_off(&server, STATE1_RW, &format!("?_type=Patient&_since={}", since)).await;
    assert_eq!(response.status(), 202);
    let manifest = manifest(&server, &status_url(&response)).await;
    assert_eq!(manifest["output"][0]["type"], "Patient");
    assert_eq!(manifest["output"][0]["count"], 1);

    let body = server
        .client
        .get(manifest["output"][0]["url"].as_str().unwrap())
        .bearer_auth(STATE1_RW)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let exported: Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
    assert_eq!(exported["name"][0]["family"], "Hopper");
}

#[tokio::test]
async fn test_finished_exports_expire() {
    let server = TestServer::start_with(|config| config.export_retention_secs = 0).await;
    server.create_patient(STATE1_RW, &patient("Lovelace")).await;

    let response = kick_off(&server, STATE1_RW, "?_type=Patient").await;
    let first = status_url(&response);
    manifest(&server, &first).await;
    let job = first.rsplit('/').next().unwrap().to_string();
    let job_dir = server.state.config.export_dir.join(&job);
    assert!(job_dir.exists());

    let response = kick_off(&server, STATE1_RW, "?_type=Patient").await;
    assert_eq!(response.status(), 202);
    let second = status_url(&response);

    let response = server
        .client
        .get(&first)
        .bearer_auth(STATE1_RW)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(!job_dir.exists());

    manifest(&server, &second).await;
}
