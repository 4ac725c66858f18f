//! Dependent-state orchestration: suspend a dependent resource, run a
//! mutation that is illegal while it is active, then bring it back.
//!
//! The canonical case is a volume mutation that the control plane rejects
//! while the owning server is running: the server is stopped, confirmed
//! stopped, the mutation runs, and the server is started again.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{OperationKind, Outcome};
use crate::error::{Error, Result};
use crate::poll::Engine;
use crate::resource::{ResourceHandle, StateSpec};

/// A resource whose active state blocks mutation of a resource it is
/// attached to.
///
/// Implementations wrap the per-resource transport calls; the engine only
/// drives them. `read`, `suspend`, and `resume` each perform one request.
#[async_trait]
pub trait DependentResource: Send + Sync {
    /// Snapshot type returned by the control plane.
    type Repr: Send;

    /// Handle of the dependent resource.
    fn handle(&self) -> &ResourceHandle;

    /// One read of the dependent.
    async fn read(&self) -> anyhow::Result<Outcome<Self::Repr>>;

    /// Issue the suspend call (stop, detach, ...).
    async fn suspend(&self) -> anyhow::Result<Outcome<Self::Repr>>;

    /// Issue the resume call.
    async fn resume(&self) -> anyhow::Result<Outcome<Self::Repr>>;

    /// Lifecycle label of a snapshot.
    fn state_of(repr: &Self::Repr) -> &str;

    /// Labels in which the dependent forbids mutating its owner.
    fn active_states(&self) -> &[&str];

    /// Label tables for confirming the dependent settled after a suspend.
    fn suspending(&self) -> StateSpec<'_>;

    /// Label tables for confirming the dependent is active again.
    fn resuming(&self) -> StateSpec<'_>;
}

/// How a failure while restoring the dependent is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// A resume failure after a successful mutation is surfaced.
    Strict,
    /// A resume failure is logged at warn and swallowed; the mutation
    /// result wins. For flows where the owner is going away regardless,
    /// such as unlink-before-delete.
    BestEffort,
}

#[derive(Clone, Copy)]
enum Transition {
    Suspend,
    Resume,
}

impl Engine {
    /// Run `mutation` with the dependent resource confirmed out of its
    /// active state, restoring it afterwards.
    ///
    /// A dependent that is absent or already out of its active state is
    /// left alone: only the mutation runs, with no suspend or resume
    /// calls. A failure while suspending aborts before the mutation is
    /// attempted. A failing mutation still gets a resume attempt, but the
    /// mutation's own error is what comes back.
    pub async fn with_suspended<D, M, MFut, T>(
        &self,
        cancel: &CancellationToken,
        dependent: &D,
        mode: ResumeMode,
        mutation: M,
    ) -> Result<T>
    where
        D: DependentResource,
        M: FnOnce() -> MFut,
        MFut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let handle = dependent.handle();

        let outcome = dependent.read().await.map_err(Error::transport)?;
        let snapshot = if self.classifier().is_not_found(outcome.status) {
            None
        } else {
            self.require_accepted(OperationKind::Read, &outcome)?;
            outcome.resource
        };

        let needs_suspend = match &snapshot {
            Some(repr) => dependent.active_states().contains(&D::state_of(repr)),
            None => false,
        };
        if !needs_suspend {
            debug!(
                dependent = %handle,
                "dependent absent or not active, running mutation directly"
            );
            return mutation().await;
        }

        info!(dependent = %handle, "suspending dependent before mutation");
        self.transition(cancel, dependent, Transition::Suspend)
            .await?;

        let result = mutation().await;

        info!(dependent = %handle, "resuming dependent");
        if let Err(resume_err) = self.transition(cancel, dependent, Transition::Resume).await {
            match (&result, mode) {
                // The mutation failed anyway; its error takes precedence.
                (Err(_), _) => {
                    warn!(
                        dependent = %handle,
                        error = %resume_err,
                        "resume failed during cleanup of a failed mutation"
                    );
                }
                (Ok(_), ResumeMode::BestEffort) => {
                    warn!(
                        dependent = %handle,
                        error = %resume_err,
                        "resume failed, continuing without it"
                    );
                }
                (Ok(_), ResumeMode::Strict) => return Err(resume_err),
            }
        }

        result
    }

    /// Issue one suspend/resume call and confirm the transition settled.
    async fn transition<D>(
        &self,
        cancel: &CancellationToken,
        dependent: &D,
        which: Transition,
    ) -> Result<()>
    where
        D: DependentResource,
    {
        let outcome = match which {
            Transition::Suspend => dependent.suspend().await,
            Transition::Resume => dependent.resume().await,
        }
        .map_err(Error::transport)?;
        self.require_accepted(OperationKind::Update, &outcome)?;

        let states = match which {
            Transition::Suspend => dependent.suspending(),
            Transition::Resume => dependent.resuming(),
        };
        self.read_until_state(
            cancel,
            dependent.handle(),
            states,
            |_| dependent.read(),
            D::state_of,
        )
        .await
        .map(|_| ())
    }
}
