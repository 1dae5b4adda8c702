use serde::{Deserialize, Serialize};

use super::CodeableConcept;

/// FHIR OperationOutcome for error responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    pub severity: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Vec<String>>,
}

impl OperationOutcomeIssue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: "error".to_string(),
            code: code.into(),
            details: None,
            diagnostics: Some(message.into()),
            location: None,
            expression: None,
        }
    }

    /// Issue pinned to a FHIRPath expression
    pub fn at(
        code: impl Into<String>,
        message: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            expression: Some(vec![expression.into()]),
            ..Self::error(code, message)
        }
    }
}

impl OperationOutcome {
    pub fn new(issue: Vec<OperationOutcomeIssue>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue,
        }
    }

    /// Create a new error outcome
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![OperationOutcomeIssue::error(code, message)])
    }

    /// Create outcome with a FHIRPath expression pinpointing the offending element
    pub fn error_at(
        code: impl Into<String>,
        message: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self::new(vec![OperationOutcomeIssue::at(code, message, expression)])
    }

    /// First issue's diagnostics, mostly useful in tests and logs
    pub fn diagnostics(&self) -> Option<&str> {
        self.issue.first().and_then(|i| i.diagnostics.as_deref())
    }
}
