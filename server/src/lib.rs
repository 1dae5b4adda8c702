//! FHIR R4 API for public-health monitoring records.

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod export;
pub mod handlers;
pub mod models;
pub mod seed;
pub mod serializer;
pub mod services;
pub mod transaction;
pub mod validation;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::AppConfig;
use db::Store;
use export::ExportRegistry;
use handlers::{export as bulk, metadata, oauth, resources, transaction as bundle};
use serializer::ResourceType;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub exports: Arc<ExportRegistry>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            exports: Arc::new(ExportRegistry::new()),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut fhir = Router::new()
        .route("/", post(bundle::process_bundle))
        .route("/metadata", get(metadata::capability_statement))
        .route(
            "/.well-known/smart-configuration",
            get(metadata::smart_configuration),
        )
        .route("/$export", get(bulk::kick_off))
        .route("/Patient/$export", get(bulk::kick_off))
        .route("/Patient/:id/$everything", get(resources::patient_everything))
        .route("/ExportStatus/:job", get(bulk::status))
        .route("/ExportFiles/:job/:type", get(bulk::file));

    for resource_type in ResourceType::ALL {
        fhir = fhir
            .route(
                &format!("/{}", resource_type),
                get(resources::search_resources)
                    .post(resources::create_resource)
                    .fallback(handlers::method_not_supported)
                    .layer(Extension(resource_type)),
            )
            .route(
                &format!("/{}/:id", resource_type),
                get(resources::read_resource)
                    .put(resources::update_resource)
                    .patch(resources::patch_resource)
                    .fallback(handlers::method_not_supported)
                    .layer(Extension(resource_type)),
            );
    }

    Router::new()
        .nest("/fhir/r4", fhir)
        .route("/oauth/token", post(oauth::token))
        .route(
            "/.well-known/smart-configuration",
            get(metadata::smart_configuration),
        )
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt as _;

    fn router() -> Router {
        let config = AppConfig::in_memory("http://localhost:3000/", "exports");
        build_router(AppState::new(Arc::new(db::MemoryStore::new()), config))
    }

    async fn send(method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_metadata_is_public() {
        let (status, body) = send(Method::GET, "/fhir/r4/metadata").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resourceType"], "CapabilityStatement");
        assert_eq!(body["rest"][0]["resource"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_routes_and_methods() {
        let (status, body) = send(Method::GET, "/fhir/r4/Encounter").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["issue"][0]["code"], "not-found");

        let (status, body) = send(Method::DELETE, "/fhir/r4/Patient/1").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["issue"][0]["code"], "not-supported");
    }

    #[tokio::test]
    async fn test_resources_require_a_token() {
        let (status, body) = send(Method::GET, "/fhir/r4/Observation").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["issue"][0]["code"], "login");
    }
}
