//! Error scans recorded on the metrics after each cycle.
//!
//! Nothing here fails the recalculation. Each problem becomes a
//! `(message, node path)` entry; messages ending in a blank are warnings.

use evman_core::{
    ComparisonDate, DependencyKind, EvDate, NodeId, TaskNode, TaskTree, Time, DAY_MILLIS,
};
use evman_schedule::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Short text set on a node that duplicates another.
pub const DUPLICATE_TASK: &str = "Duplicate task";

/// Render minutes as `h:mm`.
pub fn hours_minutes(minutes: f64) -> String {
    let total = minutes.round() as i64;
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!("{sign}{}:{:02}", total / 60, total % 60)
}

/// Scan the tree for duplicate tasks, plan-time problems, future
/// completion dates and bad node types. With `root_nodes_only`, only the
/// children of the root are checked, for duplicates by name.
pub fn check_node_errors(tree: &mut TaskTree, metrics: &mut Metrics, now: Time, root_nodes_only: bool) {
    let root = tree.root();
    let mut seen_roots: Vec<NodeId> = Vec::new();
    let mut seen_other: BTreeSet<String> = BTreeSet::new();
    if !root_nodes_only {
        check_one(tree, metrics, root, now);
    }

    for id in tree.pre_order(root).into_iter().skip(1) {
        let depth = tree.depth(id);
        if root_nodes_only && depth > 1 {
            continue;
        }
        tree[id].ev.task_error = None;
        let path = tree.full_name(id);

        if depth == 1 {
            let dup = seen_roots.iter().copied().find(|r| tree[*r].name == tree[id].name);
            if let Some(first) = dup {
                let shown = if root_nodes_only { tree[first].name.clone() } else { tree.full_name(first) };
                metrics.add_error(format!("The task \"{shown}\" appears more than once"), tree.full_name(first));
                tree[first].ev.task_error = Some(DUPLICATE_TASK.into());
            }
            seen_roots.push(id);
        } else if !seen_other.insert(path.clone()) {
            metrics.add_error(format!("The task \"{path}\" appears more than once"), path.clone());
            tree[id].ev.task_error = Some(DUPLICATE_TASK.into());
        }

        if !root_nodes_only {
            check_one(tree, metrics, id, now);
        }
    }
}

fn check_one(tree: &TaskTree, metrics: &mut Metrics, id: NodeId, now: Time) {
    let node = &tree[id];
    let path = tree.full_name(id);
    let value_pruned = node.is_value_pruned();
    let ev = &node.ev;

    if !value_pruned && ev.bottom_up_plan_time > 0.0 && (ev.plan_time - ev.bottom_up_plan_time).abs() > 0.5 {
        metrics.add_error(
            format!(
                "The top-down plan time for \"{path}\" is {}, but the subtasks add up to {}",
                hours_minutes(ev.plan_time),
                hours_minutes(ev.bottom_up_plan_time)
            ),
            path.clone(),
        );
    }
    if !value_pruned && node.plan_time_editable && node.plan_time_null {
        metrics.add_error(format!("No plan time has been entered for \"{path}\""), path.clone());
    }
    if tree.is_leaf(id) && is_future(node.date_completed, now) {
        if let Some(d) = node.date_completed {
            metrics.add_error(format!("The task \"{path}\" is marked complete in the future, on {d}"), path.clone());
        }
    }
    if node.is_node_type_missing() {
        metrics.add_error(format!("The task \"{path}\" has no type"), path);
    } else if node.is_node_type_invalid() {
        let node_type = node.node_type.as_deref().unwrap_or_default();
        metrics.add_error(format!("The task \"{path}\" has an unrecognized type \"{node_type}\""), path);
    }
}

/// More than a day after `now`, allowing for time zone differences.
pub fn is_future(d: Option<EvDate>, now: Time) -> bool {
    matches!(d, Some(EvDate::At(t)) if t.timestamp_millis() - now.timestamp_millis() > DAY_MILLIS)
}

/// Report dependencies whose target cannot be found and incomplete
/// dependencies whose dates are in the wrong order. Ordering problems are
/// warnings.
pub fn scan_dependency_errors(tree: &TaskTree, metrics: &mut Metrics, leaves: &[NodeId]) {
    for &id in leaves {
        let node = &tree[id];
        if node.date_completed.is_some() {
            continue;
        }
        let path = tree.full_name(id);
        for dep in &node.dependencies {
            let target = dep.display_name.as_deref().unwrap_or(&dep.task_id);
            match dep.kind {
                DependencyKind::Normal if dep.status.unresolvable => metrics.add_error(
                    format!("The task \"{path}\" depends on \"{target}\", which could not be found"),
                    path.clone(),
                ),
                DependencyKind::Normal if dep.is_incomplete() && dep.is_misordered() => metrics.add_error(
                    format!("The task \"{path}\" depends on \"{target}\", which is projected to finish later "),
                    path.clone(),
                ),
                DependencyKind::Reverse if dep.is_misordered() => {
                    let who = dep.status.assigned_to.as_deref().unwrap_or_default();
                    metrics.add_error(
                        format!("The task \"{path}\" is needed by {who} before it is projected to finish "),
                        path.clone(),
                    );
                }
                _ => {}
            }
        }
    }
}

/// A committed milestone, with the milestones that follow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Milestone name.
    pub name: String,
    /// Date the team committed to.
    pub commit_date: Option<EvDate>,
    /// The next milestone in order.
    pub next: Option<Box<Milestone>>,
}

/// Source of the milestones a task is labelled with.
pub trait MilestoneProvider: Send + Sync {
    /// Milestones labelled on the node.
    fn milestones_for(&self, tree: &TaskTree, id: NodeId) -> Vec<Milestone>;
}

/// Ordered milestones and the task labels naming them. Labels are keyed by
/// task identifier or by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneTable {
    /// Milestones in order, with their commit dates.
    pub milestones: Vec<(String, Option<EvDate>)>,
    /// Milestone labels per task identifier or path.
    pub labels: BTreeMap<String, BTreeSet<String>>,
}

impl MilestoneTable {
    fn chain_from(&self, start: usize) -> Option<Milestone> {
        self.milestones[start..].iter().rev().fold(None, |next, (name, commit_date)| {
            Some(Milestone { name: name.clone(), commit_date: *commit_date, next: next.map(Box::new) })
        })
    }

    fn labels_of<'a>(&'a self, node: &'a TaskNode, path: &'a str) -> impl Iterator<Item = &'a String> {
        node.task_ids
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(path))
            .filter_map(|key| self.labels.get(key))
            .flatten()
    }
}

impl MilestoneProvider for MilestoneTable {
    fn milestones_for(&self, tree: &TaskTree, id: NodeId) -> Vec<Milestone> {
        let path = tree.full_name(id);
        let names: BTreeSet<&String> = self.labels_of(&tree[id], &path).collect();
        self.milestones
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| names.contains(name))
            .filter_map(|(i, _)| self.chain_from(i))
            .collect()
    }
}

/// The first milestone in the chain whose commit date the task is
/// projected to miss by more than a day.
fn missed_milestone(node: &TaskNode, leaf: bool, milestones: &[Milestone]) -> Option<Milestone> {
    if node.date_completed.is_some() || node.is_value_pruned() || !leaf {
        return None;
    }
    let projected = ComparisonDate::Replan.of(node, false)?;
    let [first] = milestones else {
        return None;
    };
    let mut m = Some(first);
    while let Some(cur) = m {
        if let Some(commit) = cur.commit_date {
            if projected.millis().saturating_sub(commit.millis()) > DAY_MILLIS {
                return Some(Milestone { next: None, ..cur.clone() });
            }
        }
        m = cur.next.as_deref();
    }
    None
}

/// Warn once per milestone that some leaf is projected to miss.
pub fn scan_milestone_errors(
    tree: &TaskTree,
    metrics: &mut Metrics,
    leaves: &[NodeId],
    provider: &dyn MilestoneProvider,
) {
    let mut missed = BTreeMap::new();
    for &id in leaves {
        let milestones = provider.milestones_for(tree, id);
        if let Some(m) = missed_milestone(&tree[id], tree.is_leaf(id), &milestones) {
            missed.entry(m.name.clone()).or_insert(m);
        }
    }
    let root_path = tree.full_name(tree.root());
    for m in missed.into_values() {
        let commit = m.commit_date.map(|d| d.to_string()).unwrap_or_default();
        metrics.add_error(
            format!("Tasks are projected to miss the {commit} commitment for milestone \"{}\" ", m.name),
            root_path.clone(),
        );
    }
}
