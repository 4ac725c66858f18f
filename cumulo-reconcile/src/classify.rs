//! Transport outcome classification.
//!
//! Every control-plane attempt produces an [`Outcome`], which is classified
//! exactly once - success, retryable, or terminal - before any lifecycle
//! state is inspected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Structured error body returned by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Short human-readable summary.
    #[serde(default)]
    pub title: String,
    /// Longer explanation, when the control plane provides one.
    #[serde(default)]
    pub detail: Option<String>,
}

impl Problem {
    /// Problem with a title and no detail.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: None,
        }
    }

    /// Parse a response body, keeping the raw text as the title when the
    /// payload is not the structured JSON form.
    pub fn from_body(body: &[u8]) -> Self {
        let raw = || Self::new(String::from_utf8_lossy(body).trim().to_string());
        match serde_json::from_slice::<Problem>(body) {
            Ok(problem) if !problem.title.is_empty() || problem.detail.is_some() => problem,
            _ => raw(),
        }
    }

    pub(crate) fn for_status(status: u16) -> Self {
        Self::new(format!("request failed with status {status}"))
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.title, detail),
            None => write!(f, "{}", self.title),
        }
    }
}

/// The kind of call an outcome belongs to; selects the success statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Resource creation.
    Create,
    /// Resource read.
    Read,
    /// In-place mutation (tag calls, suspend/resume, ...).
    Update,
    /// Resource deletion.
    Delete,
}

/// Result of a single transport attempt: the HTTP status plus whatever the
/// transport layer decoded from the response.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    /// HTTP status code of the response.
    pub status: u16,
    /// Decoded resource representation, when the response carried one.
    pub resource: Option<T>,
    /// Parsed error body, when the response carried one.
    pub problem: Option<Problem>,
}

impl<T> Outcome<T> {
    /// Successful response with a decoded resource.
    pub fn resource(status: u16, resource: T) -> Self {
        Self {
            status,
            resource: Some(resource),
            problem: None,
        }
    }

    /// Response without a body (204, 404, ...).
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            resource: None,
            problem: None,
        }
    }

    /// Error response with a parsed problem body.
    pub fn problem(status: u16, problem: Problem) -> Self {
        Self {
            status,
            resource: None,
            problem: Some(problem),
        }
    }
}

/// Decision for one classified outcome.
#[derive(Debug)]
pub enum Classification {
    /// Terminal success for the operation kind.
    Success,
    /// Transient condition worth a backoff and another attempt.
    Retryable(RetryReason),
    /// Hard failure; surfaced to the caller unchanged.
    Terminal(Error),
}

/// Why an outcome was judged retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Transient control-plane contention (429/5xx family).
    Contention,
    /// A create collided with a resource that was recently deleted under
    /// the same uniqueness constraint and has not finished propagating.
    StaleDuplicate,
}

/// Maps transport outcomes to classifications. Pure; no side effects.
#[derive(Debug, Clone)]
pub struct Classifier {
    retryable: Vec<u16>,
    retry_create_conflict: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            retryable: vec![429, 500, 502, 503, 504],
            retry_create_conflict: true,
        }
    }
}

impl Classifier {
    /// Classifier with a custom retryable status set.
    ///
    /// `retry_create_conflict` controls whether a 409 on create is treated
    /// as a stale duplicate (retryable) instead of a hard conflict.
    pub fn new(retryable: Vec<u16>, retry_create_conflict: bool) -> Self {
        Self {
            retryable,
            retry_create_conflict,
        }
    }

    /// Whether the status counts as success for the operation kind.
    pub fn is_success(&self, kind: OperationKind, status: u16) -> bool {
        match kind {
            OperationKind::Create => matches!(status, 200 | 201 | 202),
            OperationKind::Read => status == 200,
            OperationKind::Update => matches!(status, 200 | 202 | 204),
            // Deleting something already gone has converged.
            OperationKind::Delete => matches!(status, 200 | 202 | 204 | 404),
        }
    }

    /// Whether the status means the resource does not exist.
    pub fn is_not_found(&self, status: u16) -> bool {
        status == 404
    }

    /// Classify one outcome. Called exactly once per attempt, before any
    /// state inspection.
    pub fn classify<T>(&self, kind: OperationKind, outcome: &Outcome<T>) -> Classification {
        if self.is_success(kind, outcome.status) {
            return Classification::Success;
        }
        if kind == OperationKind::Create && outcome.status == 409 && self.retry_create_conflict {
            return Classification::Retryable(RetryReason::StaleDuplicate);
        }
        if self.retryable.contains(&outcome.status) {
            return Classification::Retryable(RetryReason::Contention);
        }
        let problem = outcome
            .problem
            .clone()
            .unwrap_or_else(|| Problem::for_status(outcome.status));
        Classification::Terminal(Error::ControlPlane {
            status: outcome.status,
            problem,
        })
    }
}
