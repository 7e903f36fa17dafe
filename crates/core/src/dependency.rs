//! Task dependencies and their resolved status.

use crate::{EvDate, TaskNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// This task waits on another task.
    #[default]
    Normal,
    /// Other people wait on this task.
    Reverse,
    /// Other people share this task.
    Collab,
}

/// Which node date is compared against a dependency's projected date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonDate {
    /// Skip date comparison.
    None,
    /// Plan date.
    Plan,
    /// Replan date, then plan date.
    #[default]
    Replan,
    /// Forecast date, then replan date, then plan date.
    Forecast,
}

impl ComparisonDate {
    /// The date of `node` to compare, skipping `Never` when `reject_never`.
    pub fn of(self, node: &TaskNode, reject_never: bool) -> Option<EvDate> {
        let usable = |d: Option<EvDate>| d.filter(|d| !(reject_never && d.is_never()));
        let candidates = match self {
            ComparisonDate::None => return None,
            ComparisonDate::Plan => vec![node.ev.plan_date],
            ComparisonDate::Replan => vec![node.ev.replan_date, node.ev.plan_date],
            ComparisonDate::Forecast => {
                vec![node.ev.forecast_date, node.ev.replan_date, node.ev.plan_date]
            }
        };
        candidates.into_iter().find_map(usable)
    }
}

/// Resolved state of a dependency, refreshed every cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Name of the task list that defines the target.
    pub task_list_name: Option<String>,
    /// True when the target could not be found.
    pub unresolvable: bool,
    /// People working on the target, comma separated.
    pub assigned_to: Option<String>,
    /// Fraction of the target that is complete.
    pub percent_complete: f64,
    /// When the target is projected to finish.
    pub projected_date: Option<EvDate>,
    /// Comparison date of the dependent task.
    pub parent_date: Option<EvDate>,
}

/// A dependency from one task on an external task identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    /// Identifier of the task depended upon.
    pub task_id: String,
    /// Display name for the target.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Where the dependency was defined.
    #[serde(default)]
    pub source: Option<String>,
    /// Edge kind.
    #[serde(default)]
    pub kind: DependencyKind,
    /// Resolved status.
    #[serde(default)]
    pub status: DependencyStatus,
}

impl TaskDependency {
    /// A normal dependency on `task_id`.
    pub fn new(task_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            task_id: task_id.into(),
            display_name,
            source: None,
            kind: DependencyKind::Normal,
            status: DependencyStatus::default(),
        }
    }

    /// A reverse edge listing who waits on a task and when they need it.
    pub fn reverse(waiting: &BTreeMap<String, Option<EvDate>>) -> Self {
        let mut dep = Self::for_names(DependencyKind::Reverse, waiting.keys());
        dep.status.projected_date =
            waiting.values().fold(None, |acc, d| crate::min_start_date(acc, *d));
        dep
    }

    /// A collaboration edge listing who else works on a task.
    pub fn collab<'a>(people: impl IntoIterator<Item = &'a String>) -> Self {
        Self::for_names(DependencyKind::Collab, people)
    }

    fn for_names<'a>(kind: DependencyKind, names: impl IntoIterator<Item = &'a String>) -> Self {
        let names: Vec<&str> = names.into_iter().map(String::as_str).collect();
        let mut dep = Self::new(String::new(), None);
        dep.kind = kind;
        dep.status.assigned_to = Some(names.join(", "));
        dep
    }

    /// Not yet finished.
    pub fn is_incomplete(&self) -> bool {
        self.status.percent_complete < 1.0
    }

    /// True when the dates are in the wrong order: a normal dependency
    /// finishes after its dependent is due, or a reverse dependency's
    /// waiters need it before it is due.
    pub fn is_misordered(&self) -> bool {
        let (projected, parent) = (self.status.projected_date, self.status.parent_date);
        match self.kind {
            DependencyKind::Reverse => is_before(projected, parent),
            _ => is_before(parent, projected),
        }
    }

    /// Load the dependent task's comparison date.
    pub fn load_parent_date(&mut self, parent: &TaskNode, cmp: ComparisonDate) {
        self.status.parent_date = cmp.of(parent, true);
        if self.kind == DependencyKind::Reverse {
            self.status.percent_complete = if parent.date_completed.is_some() { 1.0 } else { 0.0 };
        }
    }

    /// Record the resolved state of the target.
    pub fn set_resolved_details(
        &mut self,
        unresolvable: bool,
        assigned_to: Option<String>,
        percent_complete: f64,
        projected_date: Option<EvDate>,
        display_name: Option<String>,
    ) {
        self.status.unresolvable = unresolvable;
        self.status.assigned_to = assigned_to;
        self.status.percent_complete = percent_complete;
        self.status.projected_date = projected_date;
        if let Some(name) = display_name.filter(|n| n.len() > 1) {
            if !unresolvable {
                self.display_name = Some(name);
            }
        }
    }
}

fn is_before(a: Option<EvDate>, b: Option<EvDate>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a < b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DAY_MILLIS;

    fn day(n: i64) -> EvDate {
        EvDate::from_millis(1_700_000_000_000 + n * DAY_MILLIS)
    }

    #[test]
    fn test_normal_misordered_when_target_finishes_late() {
        let mut dep = TaskDependency::new("T1", None);
        dep.status.projected_date = Some(day(5));
        dep.status.parent_date = Some(day(3));
        assert!(dep.is_misordered());
        dep.status.projected_date = Some(day(2));
        assert!(!dep.is_misordered());
        dep.status.parent_date = None;
        assert!(!dep.is_misordered());
    }

    #[test]
    fn test_reverse_takes_earliest_need_date() {
        let mut waiting = BTreeMap::new();
        waiting.insert("bob".to_string(), Some(day(4)));
        waiting.insert("alice".to_string(), Some(day(2)));
        waiting.insert("carol".to_string(), None);
        let mut dep = TaskDependency::reverse(&waiting);
        assert_eq!(dep.kind, DependencyKind::Reverse);
        assert_eq!(dep.status.assigned_to.as_deref(), Some("alice, bob, carol"));
        assert_eq!(dep.status.projected_date, Some(day(2)));

        dep.status.parent_date = Some(day(3));
        assert!(dep.is_misordered());
    }

    #[test]
    fn test_comparison_date_falls_back_and_rejects_never() {
        let mut node = TaskNode::new("x");
        node.ev.plan_date = Some(day(1));
        node.ev.replan_date = Some(EvDate::Never);
        assert_eq!(ComparisonDate::Replan.of(&node, true), Some(day(1)));
        assert_eq!(ComparisonDate::Replan.of(&node, false), Some(EvDate::Never));
        assert_eq!(ComparisonDate::None.of(&node, true), None);
    }

    #[test]
    fn test_resolved_details_keep_name_when_unresolvable() {
        let mut dep = TaskDependency::new("T1", Some("Old".into()));
        dep.set_resolved_details(true, None, 0.0, None, Some("New".into()));
        assert_eq!(dep.display_name.as_deref(), Some("Old"));
        dep.set_resolved_details(false, Some("bob".into()), 0.5, Some(day(1)), Some("New".into()));
        assert_eq!(dep.display_name.as_deref(), Some("New"));
        assert!(dep.is_incomplete());
    }
}
