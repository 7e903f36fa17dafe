//! Baseline snapshots.

use crate::{SnapshotId, TaskTree, Time};
use serde::{Deserialize, Serialize};

/// A named, frozen copy of a recalculated task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier.
    pub id: SnapshotId,
    /// Display name.
    pub name: String,
    /// When the snapshot was taken.
    pub taken_at: Time,
    /// The captured tree, derived values included.
    pub tree: TaskTree,
}

impl Snapshot {
    /// Capture `tree` under `name`.
    pub fn capture(name: impl Into<String>, taken_at: Time, tree: &TaskTree) -> Self {
        Self {
            id: SnapshotId::new(),
            name: name.into(),
            taken_at,
            tree: tree.clone(),
        }
    }
}
