//! Baseline comparison.
//!
//! Each node is matched to a node in the baseline tree, first through its
//! task identifiers and then by name under the matched parent. Matched nodes
//! copy the baseline's plan time and dates; unmatched nodes sum their
//! children's baseline values.

use evman_core::{max_plan_date, min_start_date, BaselineValues, NodeId, TaskNode, TaskTree};
use std::collections::BTreeMap;

/// Identifier lookup into a baseline tree. Nodes with a single assignee are
/// also indexed under `id~assignee`.
#[derive(Debug, Default)]
pub struct BaselineIdCache {
    ids: BTreeMap<String, NodeId>,
}

impl BaselineIdCache {
    /// Index the subtree of `baseline` at `root`.
    pub fn build(baseline: &TaskTree, root: NodeId) -> Self {
        let mut cache = Self::default();
        cache.add(baseline, root);
        cache
    }

    // Children first, later siblings first, so the shallowest and earliest
    // node wins a shared identifier.
    fn add(&mut self, baseline: &TaskTree, id: NodeId) {
        for c in baseline.children(id).iter().rev() {
            self.add(baseline, *c);
        }
        let node = &baseline[id];
        let suffix = assigned_to_suffix(node);
        for task_id in &node.task_ids {
            self.ids.insert(task_id.clone(), id);
            if let Some(suffix) = &suffix {
                self.ids.insert(format!("{task_id}{suffix}"), id);
            }
        }
    }

    /// Baseline node for `node`, trying the assignee-suffixed form first
    /// when `node` has a single assignee.
    pub fn find(&self, node: &TaskNode) -> Option<NodeId> {
        let suffix = assigned_to_suffix(node);
        node.task_ids.iter().find_map(|id| match &suffix {
            Some(s) => self.ids.get(&format!("{id}{s}")).copied(),
            None => self.ids.get(id).copied(),
        })
    }

    /// Number of indexed identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn assigned_to_suffix(node: &TaskNode) -> Option<String> {
    match node.assigned_to.as_slice() {
        [who] => Some(format!("~{who}")),
        _ => None,
    }
}

/// Refresh the baseline fields of every node in `tree` from `baseline`.
/// Without a baseline, or when the roots cannot be matched, every node's
/// baseline is cleared.
pub fn recalc_baseline(tree: &mut TaskTree, baseline: Option<&TaskTree>) {
    let root = tree.root();
    let matched = baseline.and_then(|b| {
        let ids = &tree[root].task_ids;
        if ids.is_empty() {
            Some(b.root())
        } else {
            b.find_by_task_ids(b.root(), ids)
        }
    });
    match (baseline, matched) {
        (Some(b), Some(b_root)) => {
            let cache = BaselineIdCache::build(b, b_root);
            calc_node(tree, root, b, Some(b_root), &cache);
        }
        _ => reset_baseline(tree, root),
    }
}

fn calc_node(
    tree: &mut TaskTree,
    id: NodeId,
    baseline: &TaskTree,
    src: Option<NodeId>,
    cache: &BaselineIdCache,
) {
    let children = tree.children(id).to_vec();
    for c in children.iter().rev() {
        let child_src = find_in_baseline(&tree[*c], baseline, src, cache);
        calc_node(tree, *c, baseline, child_src, cache);
    }

    let values = match src {
        Some(b) => {
            let b = &baseline[b];
            BaselineValues { start_date: b.ev.plan_start_date, date: b.ev.plan_date, time: b.ev.plan_time }
        }
        None => children.iter().fold(BaselineValues::default(), |acc, c| {
            let cb = &tree[*c].baseline;
            BaselineValues {
                start_date: min_start_date(acc.start_date, cb.start_date),
                date: max_plan_date(acc.date, cb.date),
                time: acc.time + cb.time,
            }
        }),
    };
    tree[id].baseline = values;
}

fn find_in_baseline(
    node: &TaskNode,
    baseline: &TaskTree,
    parent: Option<NodeId>,
    cache: &BaselineIdCache,
) -> Option<NodeId> {
    cache.find(node).or_else(|| {
        let parent = parent?;
        baseline.children(parent).iter().rev().copied().find(|c| baseline[*c].name == node.name)
    })
}

/// Clear the baseline fields of `id` and its descendants.
pub fn reset_baseline(tree: &mut TaskTree, id: NodeId) {
    for n in tree.pre_order(id) {
        tree[n].baseline = BaselineValues::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use evman_core::EvDate;

    fn day(n: u32) -> EvDate {
        EvDate::At(Utc.with_ymd_and_hms(2024, 3, n, 0, 0, 0).unwrap())
    }

    fn planned(name: &str, time: f64, date: u32) -> TaskNode {
        let mut n = TaskNode::new(name);
        n.ev.plan_time = time;
        n.ev.plan_date = Some(day(date));
        n.ev.plan_start_date = Some(day(1));
        n
    }

    #[test]
    fn test_identifier_match_ignores_structure() {
        // Baseline: /Old/Design(id 7) ; live: /New/Other/Design2(id 7)
        let mut base = TaskTree::new(TaskNode::new("root"));
        let old = base.add_child(base.root(), TaskNode::new("Old")).unwrap();
        base.add_child(old, planned("Design", 120.0, 5).with_task_id("P:7")).unwrap();

        let mut live = TaskTree::new(TaskNode::new("root"));
        let new = live.add_child(live.root(), TaskNode::new("New")).unwrap();
        let other = live.add_child(new, TaskNode::new("Other")).unwrap();
        let d = live.add_child(other, TaskNode::new("Design2").with_task_id("P:7")).unwrap();

        recalc_baseline(&mut live, Some(&base));
        assert_eq!(live[d].baseline.time, 120.0);
        assert_eq!(live[d].baseline.date, Some(day(5)));
        // Unmatched parents sum their children.
        assert_eq!(live[other].baseline.time, 120.0);
        assert_eq!(live[new].baseline.date, Some(day(5)));
    }

    #[test]
    fn test_name_match_under_matched_parent() {
        let mut base = TaskTree::new(TaskNode::new("root"));
        let a = base.add_child(base.root(), planned("A", 60.0, 3).with_task_id("P:1")).unwrap();
        base.add_child(a, planned("Code", 45.0, 4)).unwrap();

        let mut live = TaskTree::new(TaskNode::new("root"));
        let la = live.add_child(live.root(), TaskNode::new("A").with_task_id("P:1")).unwrap();
        let code = live.add_child(la, TaskNode::new("Code")).unwrap();
        let test = live.add_child(la, TaskNode::new("Test")).unwrap();

        recalc_baseline(&mut live, Some(&base));
        assert_eq!(live[code].baseline.time, 45.0);
        assert_eq!(live[test].baseline, BaselineValues::default());
        assert_eq!(live[la].baseline.time, 60.0);
    }

    #[test]
    fn test_assignee_suffix_prefers_personal_copy() {
        let mut base = TaskTree::new(TaskNode::new("root"));
        base.add_child(base.root(), planned("T", 100.0, 3).with_task_id("P:1").with_assignee("bob"))
            .unwrap();
        base.add_child(base.root(), planned("T", 200.0, 3).with_task_id("P:1").with_assignee("amy"))
            .unwrap();

        let mut live = TaskTree::new(TaskNode::new("root"));
        let t = live
            .add_child(live.root(), TaskNode::new("T").with_task_id("P:1").with_assignee("amy"))
            .unwrap();
        recalc_baseline(&mut live, Some(&base));
        assert_eq!(live[t].baseline.time, 200.0);
    }

    #[test]
    fn test_stale_baseline_is_reset() {
        let mut base = TaskTree::new(TaskNode::new("root"));
        base.add_child(base.root(), planned("Kept", 30.0, 2)).unwrap();

        let mut live = TaskTree::new(TaskNode::new("root"));
        let gone = live.add_child(live.root(), TaskNode::new("New leaf")).unwrap();
        live[gone].baseline = BaselineValues { start_date: Some(day(1)), date: Some(day(9)), time: 99.0 };

        recalc_baseline(&mut live, Some(&base));
        assert_eq!(live[gone].baseline, BaselineValues::default());

        live[gone].baseline.time = 5.0;
        recalc_baseline(&mut live, None);
        assert_eq!(live[gone].baseline.time, 0.0);
    }
}
