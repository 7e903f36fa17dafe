//! Task node data.
//!
//! A [`TaskNode`] holds two kinds of data: the raw inputs read from the data
//! store (names, identifiers, plan time, time log, completion date) and the
//! derived [`EvValues`] that every recalculation cycle rebuilds from scratch.

use crate::{EvDate, TaskDependency, Time};
use serde::{Deserialize, Serialize};

/// Node type recorded for nodes whose process requires a type but has none.
pub const MISSING_NODE_TYPE: &str = "?????";

/// Flag on the root of a plain task list.
pub const PLAIN_LIST_FLAG: &str = "plain";
/// Flag on the root of a rollup task list.
pub const ROLLUP_LIST_FLAG: &str = "rollup";
/// Flag on the root of a merged view.
pub const MERGED_LIST_FLAG: &str = "merged";

/// Pruning mark on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneState {
    /// No explicit mark; inherits from the parent.
    #[default]
    Inferred,
    /// Explicitly pruned by the user.
    UserPruned,
    /// Explicitly kept even though an ancestor is pruned.
    UserUnpruned,
    /// Pruned because an ancestor is pruned.
    AncestorPruned,
}

/// Level-of-effort state derived during recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelOfEffort {
    /// Ordinary task.
    #[default]
    None,
    /// Below a level-of-effort ancestor.
    Inherited,
    /// Level-of-effort task consuming this fraction of total time.
    Own(f64),
}

/// One time log entry against a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLogEntry {
    /// When the work started.
    pub start: Time,
    /// Minutes of work.
    pub minutes: f64,
}

/// Baseline figures copied from the matching node in a baseline snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaselineValues {
    /// Baseline plan start date.
    pub start_date: Option<EvDate>,
    /// Baseline plan completion date.
    pub date: Option<EvDate>,
    /// Baseline plan time in minutes.
    pub time: f64,
}

/// Values derived by the recalculator. Reset to `Default` at the start of
/// each cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvValues {
    /// Effective plan time.
    pub plan_time: f64,
    /// Sum of the children's plan time.
    pub bottom_up_plan_time: f64,
    /// Plan value credited to this node.
    pub plan_value: f64,
    /// Cumulative plan value at this node along the ordered leaf list.
    pub cum_plan_value: f64,
    /// Time logged before the schedule start.
    pub actual_pre_time: f64,
    /// Time logged directly against this node.
    pub actual_node_time: f64,
    /// Direct time for this subtree, excluding level-of-effort and pruned work.
    pub actual_direct_time: f64,
    /// Total time for this subtree.
    pub actual_time: f64,
    /// Time logged since the schedule start.
    pub actual_current_time: f64,
    /// Earned value.
    pub value_earned: f64,
    /// Derived level-of-effort state.
    pub level_of_effort: LevelOfEffort,
    /// Planned start date.
    pub plan_start_date: Option<EvDate>,
    /// Planned completion date.
    pub plan_date: Option<EvDate>,
    /// Replanned start date.
    pub replan_start_date: Option<EvDate>,
    /// Replanned completion date.
    pub replan_date: Option<EvDate>,
    /// Forecast start date.
    pub forecast_start_date: Option<EvDate>,
    /// Forecast completion date.
    pub forecast_date: Option<EvDate>,
    /// First time log entry after the schedule start.
    pub actual_start_date: Option<EvDate>,
    /// Short error text shown next to the node.
    pub task_error: Option<String>,
}

/// A node in a task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Name, unique among siblings.
    pub name: String,
    /// External task identifiers.
    #[serde(default)]
    pub task_ids: Vec<String>,
    /// Sibling ordinal; `0` means unassigned.
    #[serde(default)]
    pub ordinal: i32,
    /// People assigned to this task.
    #[serde(default)]
    pub assigned_to: Vec<String>,
    /// Outgoing dependencies.
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    /// Process phase type.
    #[serde(default)]
    pub node_type: Option<String>,
    /// True when the type was assigned by the process rather than the user.
    #[serde(default)]
    pub node_type_implicit: bool,
    /// Phase types allowed by the controlling process, in process order.
    #[serde(default)]
    pub acceptable_node_types: Option<Vec<String>>,
    /// Marks a node that stands for an entire task list.
    #[serde(default)]
    pub flag: Option<String>,
    /// True for containers created by the engine rather than the user.
    #[serde(default)]
    pub synthetic: bool,
    /// Pruning mark.
    #[serde(default)]
    pub prune: PruneState,
    /// Level-of-effort fraction entered by the user.
    #[serde(default)]
    pub level_of_effort: Option<f64>,
    /// Top-down plan time in minutes.
    #[serde(default)]
    pub top_down_plan_time: f64,
    /// True when no plan time has been entered.
    #[serde(default)]
    pub plan_time_null: bool,
    /// False when plan time is computed from the children.
    #[serde(default = "default_true")]
    pub plan_time_editable: bool,
    /// Time logged against this node.
    #[serde(default)]
    pub time_log: Vec<TimeLogEntry>,
    /// Completion date.
    #[serde(default)]
    pub date_completed: Option<EvDate>,
    /// Derived values.
    #[serde(default)]
    pub ev: EvValues,
    /// Baseline values.
    #[serde(default)]
    pub baseline: BaselineValues,
}

fn default_true() -> bool {
    true
}

impl TaskNode {
    /// Create a node with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_ids: Vec::new(),
            ordinal: 0,
            assigned_to: Vec::new(),
            dependencies: Vec::new(),
            node_type: None,
            node_type_implicit: false,
            acceptable_node_types: None,
            flag: None,
            synthetic: false,
            prune: PruneState::default(),
            level_of_effort: None,
            top_down_plan_time: 0.0,
            plan_time_null: false,
            plan_time_editable: true,
            time_log: Vec::new(),
            date_completed: None,
            ev: EvValues::default(),
            baseline: BaselineValues::default(),
        }
    }

    /// Builder: add a task identifier.
    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_ids.push(id.into());
        self
    }

    /// Builder: set the top-down plan time.
    pub fn with_plan(mut self, minutes: f64) -> Self {
        self.top_down_plan_time = minutes;
        self
    }

    /// Builder: set the completion date.
    pub fn with_completed(mut self, date: EvDate) -> Self {
        self.date_completed = Some(date);
        self
    }

    /// Builder: log time against this node.
    pub fn with_time(mut self, start: Time, minutes: f64) -> Self {
        self.time_log.push(TimeLogEntry { start, minutes });
        self
    }

    /// Builder: assign a person.
    pub fn with_assignee(mut self, who: impl Into<String>) -> Self {
        self.assigned_to.push(who.into());
        self
    }

    /// Builder: set the ordinal.
    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Builder: set the node type.
    pub fn with_node_type(mut self, node_type: impl Into<String>, implicit: bool) -> Self {
        self.node_type = Some(node_type.into());
        self.node_type_implicit = implicit;
        self
    }

    /// Total minutes in the time log.
    pub fn logged_minutes(&self) -> f64 {
        self.time_log.iter().map(|e| e.minutes).sum()
    }

    /// True when the derived level-of-effort state is set.
    pub fn is_level_of_effort(&self) -> bool {
        !matches!(self.ev.level_of_effort, LevelOfEffort::None)
    }

    /// True when pruned explicitly or through an ancestor.
    pub fn is_user_pruned(&self) -> bool {
        matches!(self.prune, PruneState::UserPruned | PruneState::AncestorPruned)
    }

    /// Pruned and carrying no plan value.
    pub fn is_totally_pruned(&self) -> bool {
        self.is_user_pruned() && self.ev.plan_value == 0.0
    }

    /// Completed without any plan value or plan date.
    pub fn is_chronologically_pruned(&self) -> bool {
        self.date_completed.is_some() && self.ev.plan_date.is_none() && self.ev.plan_value == 0.0
    }

    /// Excluded from value and date rollups.
    pub fn is_value_pruned(&self) -> bool {
        self.is_level_of_effort() || self.is_totally_pruned() || self.is_chronologically_pruned()
    }

    /// Fraction of the plan earned so far.
    pub fn percent_complete(&self) -> f64 {
        if self.ev.plan_value > 0.0 {
            self.ev.value_earned / self.ev.plan_value
        } else if self.date_completed.is_some() {
            1.0
        } else {
            0.0
        }
    }

    /// True when the node type marks a missing type.
    pub fn is_node_type_missing(&self) -> bool {
        self.node_type.as_deref() == Some(MISSING_NODE_TYPE)
    }

    /// True when an explicit node type is not accepted by the process.
    pub fn is_node_type_invalid(&self) -> bool {
        let Some(node_type) = self.node_type.as_deref() else {
            return false;
        };
        if node_type.is_empty() || self.node_type_implicit {
            return false;
        }
        match &self.acceptable_node_types {
            Some(types) => !types.iter().any(|t| t == node_type),
            None => false,
        }
    }

    /// True when two nodes describe the same task.
    pub fn same_task(&self, other: &TaskNode) -> bool {
        if !self.task_ids.is_empty() && !other.task_ids.is_empty() {
            self.task_ids.iter().any(|id| other.task_ids.contains(id))
        } else {
            self.name == other.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_defaults() {
        let n = TaskNode::new("Design");
        assert_eq!(n.name, "Design");
        assert!(n.plan_time_editable);
        assert_eq!(n.prune, PruneState::Inferred);
        assert!(!n.is_value_pruned());
    }

    #[test]
    fn test_pruning_predicates() {
        let mut n = TaskNode::new("x");
        n.prune = PruneState::AncestorPruned;
        assert!(n.is_user_pruned());
        assert!(n.is_totally_pruned());
        n.ev.plan_value = 3.0;
        assert!(!n.is_totally_pruned());
        n.prune = PruneState::UserUnpruned;
        assert!(!n.is_user_pruned());
    }

    #[test]
    fn test_chronologically_pruned() {
        let n = TaskNode::new("x").with_completed(EvDate::from_millis(86_400_000 * 100));
        assert!(n.is_chronologically_pruned());
        assert!(n.is_value_pruned());
    }

    #[test]
    fn test_node_type_validity() {
        let mut n = TaskNode::new("x").with_node_type("Code", false);
        assert!(!n.is_node_type_invalid());
        n.acceptable_node_types = Some(vec!["Design".into(), "Test".into()]);
        assert!(n.is_node_type_invalid());
        n.node_type_implicit = true;
        assert!(!n.is_node_type_invalid());
        n.node_type = Some(MISSING_NODE_TYPE.into());
        assert!(n.is_node_type_missing());
    }

    #[test]
    fn test_same_task_prefers_ids() {
        let a = TaskNode::new("A").with_task_id("1:1");
        let b = TaskNode::new("B").with_task_id("1:1");
        let c = TaskNode::new("A").with_task_id("2:2");
        assert!(a.same_task(&b));
        assert!(!a.same_task(&c));
        assert!(TaskNode::new("A").same_task(&TaskNode::new("A")));
    }
}
