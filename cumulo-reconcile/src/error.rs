//! Engine error types.

use std::time::Duration;

use thiserror::Error;

use crate::classify::Problem;

/// Errors surfaced by reconciliation operations.
///
/// Retryable transport failures are resolved inside the engine and never
/// appear here.
#[derive(Debug, Error)]
pub enum Error {
    /// Terminal control-plane error, parsed from the response body.
    #[error("control plane rejected the request ({status}): {problem}")]
    ControlPlane {
        /// HTTP status of the rejected request.
        status: u16,
        /// Parsed title/detail body.
        problem: Problem,
    },

    /// The transport call itself failed (connection, decode, ...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The resource entered a state from the failure set.
    #[error("resource {id} entered failure state '{state}'")]
    FailedState {
        /// Resource the state was observed on.
        id: String,
        /// The failure label.
        state: String,
    },

    /// The resource reported a state outside the pending, target, and
    /// failure sets.
    #[error("resource {id} reported unexpected state '{state}', expected one of {expected:?}")]
    UnexpectedState {
        /// Resource the state was observed on.
        id: String,
        /// The label nobody asked for.
        state: String,
        /// Labels the wait would have accepted or waited out.
        expected: Vec<String>,
    },

    /// Deadline exceeded while the operation was still pending.
    #[error("timed out after {elapsed:?} waiting for {subject}; last seen: {last_seen}")]
    Timeout {
        /// What the operation was waiting for.
        subject: String,
        /// Wall-clock time spent before giving up.
        elapsed: Duration,
        /// Last observation before the deadline (a state label or status).
        last_seen: String,
    },

    /// The caller cancelled the operation mid-flight.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn transport(err: anyhow::Error) -> Self {
        Self::Transport(format!("{err:#}"))
    }

    /// Whether this error is a deadline breach.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error is a caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
