//! Engine configuration.

use std::time::Duration;

use crate::backoff::Backoff;

/// Tunables shared by all poll operations of one engine.
///
/// Passed explicitly to the engine constructor; there is no process-wide
/// mutable state. Per-call overrides go through `Engine::with_timeout` and
/// `Engine::with_backoff`.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Wall-clock budget for a single poll operation.
    pub timeout: Duration,
    /// Wait-interval policy between attempts.
    pub backoff: Backoff,
    /// Upper bound on existence probes for a conflicting identifier during
    /// create; once spent, further conflicts fall back to plain retries
    /// under the deadline.
    pub conflict_rechecks: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            backoff: Backoff::default(),
            conflict_rechecks: 5,
        }
    }
}

impl ReconcileConfig {
    /// Default config with a different operation timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}
