//! Resource identity and lifecycle-state partitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of one control-plane resource: its id plus the project
/// scope it lives in.
///
/// The engine threads handles through to transport closures and error
/// messages without interpreting either field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Control-plane resource id.
    pub id: String,
    /// Owning project.
    pub project_id: String,
}

impl ResourceHandle {
    /// Handle for a resource scoped to a project.
    pub fn new(project_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.id)
    }
}

/// Partition of lifecycle labels for one wait.
///
/// `pending` labels are waited out, `target` labels converge, `failure`
/// labels abort as permanent failures. A label outside all three sets
/// aborts the wait as unexpected; nothing unknown is ever retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateSpec<'a> {
    /// Transient labels worth waiting out.
    pub pending: &'a [&'a str],
    /// Labels that count as converged.
    pub target: &'a [&'a str],
    /// Labels known to be permanent failures.
    pub failure: &'a [&'a str],
}

/// Where a lifecycle label falls within a [`StateSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// In the pending set.
    Pending,
    /// In the target set.
    Target,
    /// In the failure set.
    Failure,
    /// In none of the three sets.
    Unknown,
}

impl<'a> StateSpec<'a> {
    /// Spec with pending and target sets and no known failure labels.
    pub const fn new(pending: &'a [&'a str], target: &'a [&'a str]) -> Self {
        Self {
            pending,
            target,
            failure: &[],
        }
    }

    /// Spec with an explicit failure set.
    pub const fn with_failure(
        pending: &'a [&'a str],
        target: &'a [&'a str],
        failure: &'a [&'a str],
    ) -> Self {
        Self {
            pending,
            target,
            failure,
        }
    }

    /// Classify a label against the three sets. Target wins on overlap.
    pub fn kind_of(&self, label: &str) -> LabelKind {
        if self.target.contains(&label) {
            LabelKind::Target
        } else if self.pending.contains(&label) {
            LabelKind::Pending
        } else if self.failure.contains(&label) {
            LabelKind::Failure
        } else {
            LabelKind::Unknown
        }
    }

    /// Labels the wait would have accepted or waited out, for error text.
    pub(crate) fn expected(&self) -> Vec<String> {
        self.pending
            .iter()
            .chain(self.target.iter())
            .map(|s| (*s).to_string())
            .collect()
    }
}
