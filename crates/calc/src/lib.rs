//! EvMan tree recalculation.
//!
//! A [`TaskList`] runs the earned-value pipeline over its task tree: prune
//! propagation, plan-time rollup, leaf ordering, plan and earned values,
//! actual time, metrics, confidence intervals, forecasts and the error
//! scan. Rollups recalculate their children first and merge the results.
//! The [`Registry`] opens task lists by name.

#![warn(missing_docs)]

// Pipeline passes
pub mod passes;
pub mod ordering;
pub mod values;
pub mod baseline;
pub mod errors;

// Task lists
mod config;
mod calculator;
mod guard;
mod listener;
mod registry;

// Re-exports
pub use config::{
    BaselinePolicy, Capabilities, CalculatorConfig, CiPolicy, ConfigError, LeafSource, Result, Variant,
};
pub use calculator::{CiProviders, ListKind, TaskList};
pub use guard::{CircularGuard, CircularScope, RecalcGuard};
pub use listener::{ChangeListener, DependencyHook, RecalcEvent};
pub use registry::{ListDefinition, Registry};
pub use errors::{Milestone, MilestoneProvider, MilestoneTable};
