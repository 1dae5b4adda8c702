//! Request validation.
//!
//! Problems are collected rather than returned one at a time so a client sees
//! every offending element of a resource (or a whole bundle) in one
//! OperationOutcome.

pub mod enrollment;
pub mod vocab;

use chrono::{DateTime, NaiveDate};

use crate::models::OperationOutcomeIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// The JSON does not fit the FHIR structure (types, formats, bindings)
    Structure,
    /// Well-formed but breaks a business rule
    BusinessRule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    pub expression: String,
}

impl Issue {
    pub fn to_outcome_issue(&self) -> OperationOutcomeIssue {
        let code = match self.kind {
            IssueKind::Structure => "structure",
            IssueKind::BusinessRule => "business-rule",
        };
        OperationOutcomeIssue::at(code, self.message.clone(), self.expression.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Issues {
    issues: Vec<Issue>,
}

impl Issues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn structure(&mut self, expression: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            kind: IssueKind::Structure,
            message: message.into(),
            expression: expression.into(),
        });
    }

    pub fn business(&mut self, expression: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            kind: IssueKind::BusinessRule,
            message: message.into(),
            expression: expression.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn has_structural(&self) -> bool {
        self.issues.iter().any(|i| i.kind == IssueKind::Structure)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn extend(&mut self, other: Issues) {
        self.issues.extend(other.issues);
    }
}

/// Parses a FHIR `date` that must be complete (`YYYY-MM-DD`).
pub fn parse_date(
    value: Option<&str>,
    expression: impl FnOnce() -> String,
    issues: &mut Issues,
) -> Option<NaiveDate> {
    let raw = value?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            issues.structure(
                expression(),
                format!("'{}' is not a valid date; expected YYYY-MM-DD", raw),
            );
            None
        }
    }
}

/// Parses a FHIR `dateTime` and keeps the calendar date. Accepts a full date
/// or an RFC 3339 timestamp.
pub fn parse_date_time_as_date(
    value: Option<&str>,
    expression: impl FnOnce() -> String,
    issues: &mut Issues,
) -> Option<NaiveDate> {
    let raw = value?;
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.date_naive()),
        Err(_) => {
            issues.structure(
                expression(),
                format!("'{}' is not a valid dateTime", raw),
            );
            None
        }
    }
}
