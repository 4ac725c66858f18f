//! Tag reconciliation: the minimal create/delete operations moving an
//! observed tag set to a desired one.
//!
//! The control plane has no in-place tag update, so a value change becomes
//! a delete of the old pair followed by a create of the new one. Both input
//! collections are treated as unordered sets keyed by `key`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One key/value pair attached to a resource. Keys are unique within a
/// resource's tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key, unique per resource.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Tag from a key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Value change for a key present on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    /// The shared key.
    pub key: String,
    /// Value currently on the resource.
    pub from: String,
    /// Value the caller wants.
    pub to: String,
}

/// Disjoint operation sets produced by [`diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDelta {
    /// Present in desired, absent in current.
    pub to_create: Vec<Tag>,
    /// Present in current, absent in desired.
    pub to_delete: Vec<Tag>,
    /// Same key on both sides with different values.
    pub to_update: Vec<TagUpdate>,
}

/// One call against the control plane's tag endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOp {
    /// Attach the tag.
    Create(Tag),
    /// Detach the tag.
    Delete(Tag),
}

impl TagDelta {
    /// True when current and desired already agree.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty() && self.to_update.is_empty()
    }

    /// Expand into the exact call order for the control plane: every delete
    /// (including the old value of each update) before any create, so a key
    /// is never duplicated mid-flight.
    pub fn ops(&self) -> Vec<TagOp> {
        let mut ops =
            Vec::with_capacity(self.to_delete.len() + self.to_create.len() + 2 * self.to_update.len());
        for tag in &self.to_delete {
            ops.push(TagOp::Delete(tag.clone()));
        }
        for update in &self.to_update {
            ops.push(TagOp::Delete(Tag::new(update.key.clone(), update.from.clone())));
        }
        for update in &self.to_update {
            ops.push(TagOp::Create(Tag::new(update.key.clone(), update.to.clone())));
        }
        for tag in &self.to_create {
            ops.push(TagOp::Create(tag.clone()));
        }
        ops
    }
}

/// Compute the minimal operations moving `current` to `desired`.
///
/// The result depends only on the (key, value) sets, not on input order,
/// and comes out sorted by key.
pub fn diff(current: &[Tag], desired: &[Tag]) -> TagDelta {
    let current_by_key: BTreeMap<&str, &str> = current
        .iter()
        .map(|tag| (tag.key.as_str(), tag.value.as_str()))
        .collect();
    let desired_by_key: BTreeMap<&str, &str> = desired
        .iter()
        .map(|tag| (tag.key.as_str(), tag.value.as_str()))
        .collect();

    let mut delta = TagDelta::default();
    for (key, value) in &desired_by_key {
        match current_by_key.get(key) {
            None => delta.to_create.push(Tag::new(*key, *value)),
            Some(current_value) if current_value != value => delta.to_update.push(TagUpdate {
                key: (*key).to_string(),
                from: (*current_value).to_string(),
                to: (*value).to_string(),
            }),
            Some(_) => {}
        }
    }
    for (key, value) in &current_by_key {
        if !desired_by_key.contains_key(key) {
            delta.to_delete.push(Tag::new(*key, *value));
        }
    }
    delta
}
