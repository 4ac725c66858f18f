//! cumulo-reconcile - lifecycle convergence engine for the cumulo control
//! plane.
//!
//! The control plane is asynchronous: a create/update/delete call returns
//! immediately with the resource in a transitional lifecycle state
//! (`pending`, `creating`, `attaching`, ...) and callers must poll until a
//! terminal state before using the resource or chaining further work. This
//! crate turns those eventually-consistent operations into safe-to-chain
//! calls:
//!
//! - [`Engine`] drives create-until-accepted, read-until-target-state, and
//!   delete-until-gone over caller-supplied transport closures,
//! - [`tags::diff`] computes the minimal tag operations between an observed
//!   and a desired tag set,
//! - [`Engine::with_suspended`] wraps a mutation that is illegal while a
//!   dependent resource is active in confirmed suspend/resume transitions.
//!
//! Transport (one request per closure call) and schema mapping stay with
//! the caller. The engine owns no persistent state: every operation is
//! self-contained and idempotent at the "poll until X" level, so a caller
//! may rerun a whole higher-level operation from scratch at any time.

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;
pub mod poll;
pub mod resource;
pub mod suspend;
pub mod tags;

pub use backoff::{Backoff, Deadline};
pub use classify::{Classification, Classifier, OperationKind, Outcome, Problem, RetryReason};
pub use config::ReconcileConfig;
pub use error::{Error, Result};
pub use poll::{DuplicateStatus, Engine};
pub use resource::{LabelKind, ResourceHandle, StateSpec};
pub use suspend::{DependentResource, ResumeMode};
pub use tags::{Tag, TagDelta, TagOp, TagUpdate};
