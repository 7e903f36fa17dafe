//! EvMan core data models.
//!
//! This crate defines the task tree and the values carried on it: dates with
//! their sentinels, task nodes, dependencies and baseline snapshots.

#![warn(missing_docs)]

// Core identities
mod id;
mod date;

// Task tree
mod node;
mod tree;
mod error;

// Relations and history
mod dependency;
mod snapshot;

// Re-exports
pub use id::*;
pub use date::*;

pub use node::{
    BaselineValues, EvValues, LevelOfEffort, PruneState, TaskNode, TimeLogEntry,
    MERGED_LIST_FLAG, MISSING_NODE_TYPE, PLAIN_LIST_FLAG, ROLLUP_LIST_FLAG,
};
pub use tree::{NestedTask, TaskTree};
pub use error::{Result, TreeError};

pub use dependency::{ComparisonDate, DependencyKind, DependencyStatus, TaskDependency};
pub use snapshot::Snapshot;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
