//! Change notification and the dependency refresh hook.

use evman_core::TaskTree;

/// Summary of a completed recalculation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcEvent {
    /// Task list that was recalculated.
    pub task_list: String,
    /// Cycle number, counting from 1.
    pub cycle: u64,
    /// Number of entries in the error list.
    pub error_count: usize,
}

/// Notified once per completed recalculation cycle, never for the
/// intermediate steps.
pub trait ChangeListener: Send + Sync {
    /// Called after `event.task_list` has been recalculated.
    fn recalculated(&self, event: &RecalcEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&RecalcEvent) + Send + Sync,
{
    fn recalculated(&self, event: &RecalcEvent) {
        self(event)
    }
}

/// Refreshes the resolved state of the dependencies in a tree. Runs once
/// per cycle, after the forecast dates are known and before dependencies
/// are checked for errors.
pub trait DependencyHook: Send + Sync {
    /// Update the dependencies in `tree`, which belongs to `task_list`.
    fn refresh(&self, task_list: &str, tree: &mut TaskTree);
}
