use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::StoreError;
use crate::models::OperationOutcome;
use crate::validation::Issues;

pub const FHIR_JSON: &str = "application/fhir+json";

/// JSON body served as `application/fhir+json`
pub struct FhirJson<T>(pub T);

impl<T: Serialize> IntoResponse for FhirJson<T> {
    fn into_response(self) -> Response {
        let mut response = Json(self.0).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));
        response
    }
}

/// Error response with FHIR OperationOutcome
#[derive(Debug)]
pub struct FhirError {
    pub status: StatusCode,
    pub outcome: OperationOutcome,
}

pub type FhirResult<T> = Result<T, FhirError>;

impl FhirError {
    pub fn new(status: StatusCode, outcome: OperationOutcome) -> Self {
        Self { status, outcome }
    }

    /// Malformed request (bad JSON, wrong resource type, bad parameter)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            OperationOutcome::error("invalid", message),
        )
    }

    pub fn structure_at(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            OperationOutcome::error_at("structure", message, expression),
        )
    }

    pub fn unprocessable_at(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            OperationOutcome::error_at("business-rule", message, expression),
        )
    }

    /// 400 when any issue is structural, 422 otherwise.
    pub fn from_issues(issues: &Issues) -> Self {
        let status = if issues.has_structural() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        Self::new(
            status,
            OperationOutcome::new(issues.iter().map(|i| i.to_outcome_issue()).collect()),
        )
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            OperationOutcome::error("login", message),
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            OperationOutcome::error("forbidden", message),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            OperationOutcome::error("not-found", message),
        )
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            OperationOutcome::error("not-supported", message),
        )
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            OperationOutcome::error("not-supported", message),
        )
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            OperationOutcome::error("throttled", message),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            OperationOutcome::error("exception", message),
        )
    }
}

impl From<StoreError> for FhirError {
    fn from(err: StoreError) -> Self {
        tracing::error!("storage failure: {}", err);
        Self::internal_error("An internal error occurred while accessing storage")
    }
}

impl IntoResponse for FhirError {
    fn into_response(self) -> Response {
        let challenge = self.status == StatusCode::UNAUTHORIZED;
        let mut response = (self.status, FhirJson(self.outcome)).into_response();
        if challenge {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_kinds_pick_status() {
        let mut issues = Issues::new();
        issues.business("Patient.name[0].family", "Last name is required");
        assert_eq!(
            FhirError::from_issues(&issues).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        issues.structure("Patient.birthDate", "bad date");
        let err = FhirError::from_issues(&issues);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.outcome.issue.len(), 2);
        assert_eq!(err.outcome.issue[1].code, "structure");
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = FhirError::unauthorized("missing token").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(response.headers()[header::CONTENT_TYPE], FHIR_JSON);
    }

    #[test]
    fn test_store_errors_are_generic() {
        let err: FhirError = StoreError::UnknownKind("secret_table".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.outcome.diagnostics().unwrap().contains("secret_table"));
    }
}
