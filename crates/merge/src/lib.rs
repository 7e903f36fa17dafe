//! EvMan task-list merging.
//!
//! A rollup keeps each contributor's tasks apart. [`TaskListMerger`] folds
//! them into a single tree, matching nodes by task identifier and sibling
//! name, and recalculates the merged values. [`MergeOptions`] controls
//! whether contributors' leaves survive, whether single-child chains
//! collapse and which source nodes take part.

#![warn(missing_docs)]

mod error;
mod keys;
mod merger;
mod options;

pub use error::{MergeError, Result};
pub use keys::{KeyId, TaskKeys};
pub use merger::{MergedTree, TaskListMerger};
pub use options::MergeOptions;
