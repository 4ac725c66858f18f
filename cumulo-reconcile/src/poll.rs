//! Poll engine: drives asynchronous control-plane operations until they
//! converge, fail, time out, or get cancelled.
//!
//! All operations take caller-supplied transport closures performing one
//! request each; the engine never builds requests itself. Waits run under
//! `tokio::select!` against the caller's [`CancellationToken`], so a
//! cancellation interrupts a sleep immediately.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, Deadline};
use crate::classify::{
    Classification, Classifier, OperationKind, Outcome, Problem, RetryReason,
};
use crate::config::ReconcileConfig;
use crate::error::{Error, Result};
use crate::resource::{LabelKind, ResourceHandle, StateSpec};

/// What a bounded existence probe found out about a conflicting identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateStatus {
    /// The conflicting resource is gone; retry the create right away.
    Gone,
    /// The conflicting resource is still being deleted; retry after a wait.
    Deleting,
    /// The conflicting resource is alive; the conflict is real.
    Live,
}

/// Reconciliation engine over caller-supplied transport closures.
///
/// One engine per control-plane client is enough: operations borrow it
/// immutably and carry no state between calls, so independent resources can
/// be reconciled concurrently from separate tasks. Concurrent operations on
/// the *same* resource handle are the caller's responsibility to avoid.
#[derive(Debug, Clone)]
pub struct Engine {
    config: ReconcileConfig,
    classifier: Classifier,
}

impl Engine {
    /// Engine with the default classifier.
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            classifier: Classifier::default(),
        }
    }

    /// Engine with a custom classifier.
    pub fn with_classifier(config: ReconcileConfig, classifier: Classifier) -> Self {
        Self { config, classifier }
    }

    /// Copy of this engine with a different operation timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut engine = self.clone();
        engine.config.timeout = timeout;
        engine
    }

    /// Copy of this engine with a different backoff policy.
    pub fn with_backoff(&self, backoff: Backoff) -> Self {
        let mut engine = self.clone();
        engine.config.backoff = backoff;
        engine
    }

    /// Current configuration.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Issue a create call, retrying transient rejections until the control
    /// plane accepts it.
    ///
    /// Returns the created representation as soon as the create is
    /// accepted; the resource may still be in a transitional lifecycle
    /// state. Converging on a target state is a separate, explicit
    /// [`read_until_state`](Self::read_until_state) call.
    pub async fn create_until_accepted<T, C, CFut>(
        &self,
        cancel: &CancellationToken,
        call: C,
    ) -> Result<T>
    where
        C: FnMut() -> CFut,
        CFut: Future<Output = anyhow::Result<Outcome<T>>>,
    {
        // Without a probe a stale duplicate is assumed to be draining and
        // retried under the deadline like any other transient rejection.
        self.create_until_accepted_checked(cancel, call, |_| async {
            Ok(DuplicateStatus::Deleting)
        })
        .await
    }

    /// [`create_until_accepted`](Self::create_until_accepted) with a
    /// bounded existence probe for stale-duplicate conflicts.
    ///
    /// When a create conflicts with a resource recently deleted under the
    /// same uniqueness constraint, `probe` re-reads the conflicting
    /// identifier to decide what the conflict means. At most
    /// [`conflict_rechecks`](crate::ReconcileConfig::conflict_rechecks)
    /// probes are made per operation; after that, conflicts are retried
    /// like plain contention until the deadline.
    pub async fn create_until_accepted_checked<T, C, CFut, P, PFut>(
        &self,
        cancel: &CancellationToken,
        mut call: C,
        mut probe: P,
    ) -> Result<T>
    where
        C: FnMut() -> CFut,
        CFut: Future<Output = anyhow::Result<Outcome<T>>>,
        P: FnMut(Problem) -> PFut,
        PFut: Future<Output = anyhow::Result<DuplicateStatus>>,
    {
        let deadline = Deadline::after(self.config.timeout);
        let mut attempt = 0u32;
        let mut probes = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let outcome = call().await.map_err(Error::transport)?;
            let status = outcome.status;
            match self.classifier.classify(OperationKind::Create, &outcome) {
                Classification::Success => {
                    info!(status, attempt, "create accepted");
                    return outcome.resource.ok_or_else(|| {
                        Error::Transport(
                            "create was accepted but the response carried no resource".into(),
                        )
                    });
                }
                Classification::Terminal(err) => return Err(err),
                Classification::Retryable(reason) => {
                    let mut last_seen = format!("status {status}");
                    if reason == RetryReason::StaleDuplicate
                        && probes < self.config.conflict_rechecks
                    {
                        probes += 1;
                        let problem = outcome
                            .problem
                            .clone()
                            .unwrap_or_else(|| Problem::for_status(status));
                        match probe(problem.clone()).await.map_err(Error::transport)? {
                            DuplicateStatus::Gone => {
                                debug!(attempt, "conflicting resource gone, retrying create");
                                attempt += 1;
                                continue;
                            }
                            DuplicateStatus::Deleting => {
                                last_seen =
                                    format!("conflict with a still-deleting resource ({status})");
                            }
                            DuplicateStatus::Live => {
                                return Err(Error::ControlPlane { status, problem });
                            }
                        }
                    }
                    if deadline.expired() {
                        return Err(Error::Timeout {
                            subject: "create to be accepted".into(),
                            elapsed: deadline.elapsed(),
                            last_seen,
                        });
                    }
                    let wait = deadline.clamp(self.config.backoff.delay(attempt));
                    warn!(
                        status,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "create rejected, retrying"
                    );
                    self.wait(cancel, wait).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// Poll a resource until its lifecycle label reaches the target set.
    ///
    /// Only lifecycle-state transitions are waited out at this layer: a
    /// transport failure or a non-success status aborts immediately. A
    /// label from the failure set aborts as [`Error::FailedState`], a label
    /// outside all three sets as [`Error::UnexpectedState`], and a deadline
    /// breach while still pending as [`Error::Timeout`] carrying the
    /// elapsed time and the last-seen state.
    pub async fn read_until_state<T, R, RFut, S>(
        &self,
        cancel: &CancellationToken,
        handle: &ResourceHandle,
        states: StateSpec<'_>,
        mut read: R,
        state_of: S,
    ) -> Result<T>
    where
        R: FnMut(&ResourceHandle) -> RFut,
        RFut: Future<Output = anyhow::Result<Outcome<T>>>,
        S: Fn(&T) -> &str,
    {
        let deadline = Deadline::after(self.config.timeout);
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let outcome = read(handle).await.map_err(Error::transport)?;
            self.require_accepted(OperationKind::Read, &outcome)?;
            let resource = outcome.resource.ok_or_else(|| {
                Error::Transport(format!("read of {handle} returned no resource"))
            })?;
            let state = state_of(&resource).to_string();
            match states.kind_of(&state) {
                LabelKind::Target => {
                    debug!(resource = %handle, %state, attempt, "resource converged");
                    return Ok(resource);
                }
                LabelKind::Failure => {
                    return Err(Error::FailedState {
                        id: handle.to_string(),
                        state,
                    });
                }
                LabelKind::Unknown => {
                    return Err(Error::UnexpectedState {
                        id: handle.to_string(),
                        state,
                        expected: states.expected(),
                    });
                }
                LabelKind::Pending => {}
            }
            if deadline.expired() {
                return Err(Error::Timeout {
                    subject: format!("resource {handle} to reach {:?}", states.target),
                    elapsed: deadline.elapsed(),
                    last_seen: format!("state '{state}'"),
                });
            }
            let wait = deadline.clamp(self.config.backoff.delay(attempt));
            debug!(
                resource = %handle,
                %state,
                wait_ms = wait.as_millis() as u64,
                "resource still pending"
            );
            self.wait(cancel, wait).await?;
            attempt += 1;
        }
    }

    /// Issue a delete call, retrying transient rejections until the control
    /// plane accepts it or reports the resource already gone.
    ///
    /// Acceptance is treated as sufficient; there is no post-delete
    /// existence polling.
    pub async fn delete_until_gone<T, D, DFut>(
        &self,
        cancel: &CancellationToken,
        handle: &ResourceHandle,
        mut delete: D,
    ) -> Result<()>
    where
        D: FnMut(&ResourceHandle) -> DFut,
        DFut: Future<Output = anyhow::Result<Outcome<T>>>,
    {
        let deadline = Deadline::after(self.config.timeout);
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let outcome = delete(handle).await.map_err(Error::transport)?;
            let status = outcome.status;
            match self.classifier.classify(OperationKind::Delete, &outcome) {
                Classification::Success => {
                    if self.classifier.is_not_found(status) {
                        debug!(resource = %handle, "resource already gone");
                    } else {
                        info!(resource = %handle, status, "delete accepted");
                    }
                    return Ok(());
                }
                Classification::Terminal(err) => return Err(err),
                Classification::Retryable(_) => {
                    if deadline.expired() {
                        return Err(Error::Timeout {
                            subject: format!("delete of {handle} to be accepted"),
                            elapsed: deadline.elapsed(),
                            last_seen: format!("status {status}"),
                        });
                    }
                    let wait = deadline.clamp(self.config.backoff.delay(attempt));
                    warn!(
                        resource = %handle,
                        status,
                        wait_ms = wait.as_millis() as u64,
                        "delete rejected, retrying"
                    );
                    self.wait(cancel, wait).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// Classify an outcome that must succeed in one shot (reads, suspend
    /// and resume calls). Retryable statuses are surfaced as terminal here;
    /// the caller owns any retry decision at this layer.
    pub(crate) fn require_accepted<T>(
        &self,
        kind: OperationKind,
        outcome: &Outcome<T>,
    ) -> Result<()> {
        match self.classifier.classify(kind, outcome) {
            Classification::Success => Ok(()),
            Classification::Terminal(err) => Err(err),
            Classification::Retryable(_) => Err(Error::ControlPlane {
                status: outcome.status,
                problem: outcome
                    .problem
                    .clone()
                    .unwrap_or_else(|| Problem::for_status(outcome.status)),
            }),
        }
    }

    /// Cancellable sleep.
    async fn wait(&self, cancel: &CancellationToken, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn engine() -> Engine {
        Engine::new(ReconcileConfig {
            timeout: Duration::from_millis(200),
            backoff: Backoff::fixed(Duration::from_millis(1)),
            conflict_rechecks: 3,
        })
    }

    fn handle() -> ResourceHandle {
        ResourceHandle::new("proj-1", "srv-1")
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Snap {
        state: &'static str,
    }

    fn state_of(snap: &Snap) -> &str {
        snap.state
    }

    #[tokio::test]
    async fn read_converges_without_sleeping_when_already_on_target() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let snap = engine()
            .read_until_state(
                &cancel,
                &handle(),
                StateSpec::new(&["pending"], &["available"]),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Outcome::resource(200, Snap { state: "available" })) }
                },
                state_of,
            )
            .await
            .unwrap();
        assert_eq!(snap, Snap { state: "available" });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_aborts_on_unexpected_state_after_one_call() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let err = engine()
            .read_until_state(
                &cancel,
                &handle(),
                StateSpec::new(&["pending"], &["available"]),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Outcome::resource(200, Snap { state: "hibernating" })) }
                },
                state_of,
            )
            .await
            .unwrap_err();
        match err {
            Error::UnexpectedState { state, expected, .. } => {
                assert_eq!(state, "hibernating");
                assert_eq!(expected, vec!["pending".to_string(), "available".to_string()]);
            }
            other => panic!("expected unexpected-state error, got {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_aborts_on_failure_state() {
        let cancel = CancellationToken::new();
        let err = engine()
            .read_until_state(
                &cancel,
                &handle(),
                StateSpec::with_failure(&["pending"], &["available"], &["error"]),
                |_| async { Ok(Outcome::resource(200, Snap { state: "error" })) },
                state_of,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedState { state, .. } if state == "error"));
    }

    #[tokio::test]
    async fn read_does_not_retry_transport_trouble() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let err = engine()
            .read_until_state(
                &cancel,
                &handle(),
                StateSpec::new(&["pending"], &["available"]),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Outcome::<Snap>::empty(503)) }
                },
                state_of,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ControlPlane { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_of_an_absent_resource_is_one_call() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        engine()
            .delete_until_gone(&cancel, &handle(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Outcome::<()>::empty(404)) }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_returns_the_accepted_representation() {
        let cancel = CancellationToken::new();
        let snap = engine()
            .create_until_accepted(&cancel, || async {
                Ok(Outcome::resource(201, Snap { state: "creating" }))
            })
            .await
            .unwrap();
        // Acceptance is not convergence: the snapshot is still pending.
        assert_eq!(snap.state, "creating");
    }

    #[tokio::test]
    async fn create_without_a_body_is_a_transport_error() {
        let cancel = CancellationToken::new();
        let err = engine()
            .create_until_accepted(&cancel, || async { Ok(Outcome::<Snap>::empty(201)) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
