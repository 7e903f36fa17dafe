//! EvMan dependency resolution.
//!
//! The [`DependencyResolver`] indexes every known task list and the project
//! hierarchy so that a task identifier can be traced to the lists defining
//! it, its canonical name and the people waiting on it. The
//! [`DependencyUpdater`] uses it to refresh the status of each dependency in
//! a task tree.

#![warn(missing_docs)]

mod config;
mod index;
mod resolver;
mod source;
mod status;

pub use config::{Clock, ManualClock, ResolverConfig, SystemClock};
pub use index::{
    list_preference, pseudo_task_id, ListIndex, NameIndex, Ranked, ResolverIndex, Waiting, PSEUDO_TASK_PREFIX,
};
pub use resolver::{split_task_id, DependencyResolver};
pub use source::{HierarchyEntry, SourceList, StaticSource, TaskListSource, TemplateKind};
pub use status::{best_task_ids, path_concat, DependencyUpdater};
