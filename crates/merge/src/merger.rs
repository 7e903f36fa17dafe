//! The task-list merger.
//!
//! A rollup shows one project through several people's schedules. The
//! merger folds those schedules into one tree: nodes that share a task
//! identifier become one node, siblings that share a name become one node,
//! and the values of every merged node are summed again from the result.
//!
//! The output only depends on the input tree and the options. Keys and
//! nodes are visited in a fixed order, so merging the same input twice
//! gives identical trees.

use crate::error::Result;
use crate::keys::{KeyId, TaskKeys};
use crate::options::MergeOptions;
use evman_calc::baseline::recalc_baseline;
use evman_calc::passes::recalc_rollup_node;
use evman_calc::TaskList;
use evman_core::{
    NodeId, Snapshot, SnapshotId, TaskDependency, TaskNode, TaskTree, MERGED_LIST_FLAG, ROLLUP_LIST_FLAG,
};
use evman_deps::{best_task_ids, path_concat, DependencyResolver};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// A merged tree and the source nodes behind each of its nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTree {
    tree: TaskTree,
    sources: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl MergedTree {
    /// The merged tree.
    pub fn tree(&self) -> &TaskTree {
        &self.tree
    }

    /// Take the merged tree.
    pub fn into_tree(self) -> TaskTree {
        self.tree
    }

    /// Source nodes merged into `id` itself.
    pub fn sources(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.sources.get(&id)
    }

    /// Source nodes merged into `id` and everything below it.
    pub fn tasks_merged_beneath(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.tree
            .pre_order(id)
            .into_iter()
            .filter_map(|n| self.sources.get(&n))
            .flatten()
            .copied()
            .collect()
    }
}

/// Merges task lists, keeping the merged baseline between calls.
#[derive(Debug, Clone, Default)]
pub struct TaskListMerger {
    options: MergeOptions,
    resolver: Option<Arc<DependencyResolver>>,
    baseline: Option<(SnapshotId, Arc<TaskTree>)>,
}

impl TaskListMerger {
    /// A merger with `options`.
    pub fn new(options: MergeOptions) -> Self {
        Self { options, resolver: None, baseline: None }
    }

    /// Builder: look up canonical names of top-level nodes through
    /// `resolver`.
    pub fn with_resolver(mut self, resolver: Arc<DependencyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The options in use.
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge a recalculated task list. Without a filter, the list's
    /// baseline is merged the same way and compared against.
    pub fn merge(&mut self, list: &TaskList) -> Result<MergedTree> {
        let baseline = match (list.baseline(), &self.options.filter) {
            (Some(snapshot), None) => Some(self.merged_baseline(snapshot)?),
            _ => None,
        };
        let merge = Merge::new(list.tree(), &self.options, self.resolver.as_deref());
        merge.run(list.name(), baseline.as_deref())
    }

    /// Merge a bare tree, without baseline data.
    pub fn merge_tree(&self, name: &str, tree: &TaskTree) -> Result<MergedTree> {
        Merge::new(tree, &self.options, self.resolver.as_deref()).run(name, None)
    }

    fn merged_baseline(&mut self, snapshot: &Snapshot) -> Result<Arc<TaskTree>> {
        if let Some((id, tree)) = &self.baseline {
            if *id == snapshot.id {
                debug!(snapshot = %snapshot.id, "reusing merged baseline");
                return Ok(Arc::clone(tree));
            }
        }
        let options = self.options.for_baseline();
        let root = snapshot.tree.root();
        let merged = Merge::new(&snapshot.tree, &options, self.resolver.as_deref())
            .run(&snapshot.tree[root].name, None)?
            .into_tree();
        let merged = Arc::new(merged);
        self.baseline = Some((snapshot.id, Arc::clone(&merged)));
        Ok(merged)
    }
}

/// One merge run over a source tree.
struct Merge<'a> {
    src: &'a TaskTree,
    options: &'a MergeOptions,
    resolver: Option<&'a DependencyResolver>,
    admitted: Option<BTreeSet<NodeId>>,
    keys: TaskKeys,
    out: TaskTree,
    sources: BTreeMap<NodeId, BTreeSet<NodeId>>,
    next_temp: u32,
}

impl<'a> Merge<'a> {
    fn new(src: &'a TaskTree, options: &'a MergeOptions, resolver: Option<&'a DependencyResolver>) -> Self {
        Self {
            src,
            options,
            resolver,
            admitted: None,
            keys: TaskKeys::new(),
            out: TaskTree::new(TaskNode::new("")),
            sources: BTreeMap::new(),
            next_temp: 1,
        }
    }

    fn run(mut self, name: &str, baseline: Option<&TaskTree>) -> Result<MergedTree> {
        let out_root = self.out.root();
        self.out[out_root].name = name.to_string();
        self.out[out_root].flag = Some(MERGED_LIST_FLAG.to_string());
        self.sources.insert(out_root, BTreeSet::new());

        let root = self.src.root();
        if let Some(filter) = &self.options.filter {
            let mut admitted = BTreeSet::new();
            admit(self.src, root, filter, &mut admitted);
            self.admitted = Some(admitted);
        }

        self.collect_keys(root);
        if self.keys.is_empty() {
            debug!(task_list = name, "nothing to merge");
            return Ok(MergedTree { tree: self.out, sources: self.sources });
        }
        self.define_parentage(None, root);
        self.merge_similarly_named_children(None);
        self.create_merged_nodes()?;
        if let Some(baseline) = baseline {
            recalc_baseline(&mut self.out, Some(baseline));
        }
        if self.options.simplify {
            self.simplify(out_root)?;
        }

        info!(task_list = name, keys = self.keys.len(), nodes = self.out.len(), "task list merged");
        Ok(MergedTree { tree: self.out, sources: self.sources })
    }

    /// Level-of-effort and pruned nodes never take part, nor anything the
    /// filter leaves out.
    fn is_eligible(&self, id: NodeId) -> bool {
        let node = &self.src[id];
        !node.is_level_of_effort()
            && !node.is_totally_pruned()
            && self.admitted.as_ref().map_or(true, |a| a.contains(&id))
    }

    fn is_included(&self, id: NodeId) -> bool {
        self.options.filter.as_ref().map_or(true, |f| f.contains(&id))
    }

    // === Key discovery ===

    // Flagged nodes stand for whole task lists and carry no task data.
    fn collect_keys(&mut self, id: NodeId) {
        if !self.is_eligible(id) {
            return;
        }
        if self.src[id].flag.is_none() {
            self.keys.add_node(id, &self.src[id]);
        }
        for c in self.src.children(id).iter().rev() {
            self.collect_keys(*c);
        }
    }

    // A missing parent key never overwrites one found in another list.
    fn define_parentage(&mut self, parent: Option<KeyId>, id: NodeId) {
        if !self.is_eligible(id) {
            return;
        }
        let key = self.keys.key_of(id);
        if let (Some(key), Some(parent)) = (key, parent) {
            self.keys.set_parent(key, parent);
        }
        for c in self.src.children(id).iter().rev() {
            self.define_parentage(key, *c);
        }
    }

    fn merge_similarly_named_children(&mut self, parent: Option<KeyId>) {
        let mut pending: VecDeque<KeyId> = self.keys.children(parent).into();
        let mut merged = Vec::new();
        while let Some(one) = pending.pop_front() {
            let mut rest = VecDeque::new();
            for sibling in pending.drain(..) {
                if self.keys.names(one).is_disjoint(self.keys.names(sibling)) {
                    rest.push_back(sibling);
                } else {
                    self.keys.union(one, sibling);
                }
            }
            pending = rest;
            merged.push(one);
        }
        for key in merged {
            self.merge_similarly_named_children(Some(key));
        }
    }

    // === Materialization ===

    fn create_merged_nodes(&mut self) -> Result<()> {
        let out_root = self.out.root();
        let mut by_name: BTreeMap<String, KeyId> = BTreeMap::new();
        let mut ordered = Vec::new();
        for key in self.keys.children(None) {
            let (ordinal, name) = self.name_for_root(key);
            match by_name.get(&name) {
                // Two top-level keys wanting one name become one node.
                Some(&existing) => {
                    self.keys.union(existing, key);
                }
                None => {
                    by_name.insert(name.clone(), key);
                    ordered.push((ordinal, name, key));
                }
            }
        }
        ordered.sort();
        for (_, name, key) in ordered {
            self.add_child(out_root, key, name)?;
        }
        recalc_rollup_node(&mut self.out, out_root);
        Ok(())
    }

    fn add_child(&mut self, parent: NodeId, key: KeyId, name: String) -> Result<()> {
        let new = self.out.add_child(parent, TaskNode::new(name))?;
        let nodes = self.keys.nodes(key).clone();
        self.sources.insert(new, nodes.clone());

        let child_keys = self.keys.children(Some(key));
        let leaves: Vec<NodeId> =
            nodes.iter().copied().filter(|n| self.src.is_leaf(*n) && self.is_included(*n)).collect();
        self.populate(new, &nodes, child_keys, leaves)
    }

    fn populate(&mut self, new: NodeId, nodes: &BTreeSet<NodeId>, child_keys: Vec<KeyId>, mut leaves: Vec<NodeId>) -> Result<()> {
        let mut named: Vec<(i64, String, KeyId)> = child_keys
            .into_iter()
            .map(|k| {
                let (ordinal, name) = self.name_for_subtask(k);
                (ordinal, name, k)
            })
            .collect();
        named.sort();
        for (_, name, key) in named {
            self.add_child(new, key, name)?;
        }
        let true_children = self.out.children(new).len();

        // Contributors' leaves are added as temporary children so the
        // rollup below counts them.
        if self.options.preserve_leaves {
            leaves.sort_by_key(|l| self.src[*l].assigned_to.join(", "));
        }
        for &leaf in &leaves {
            let mut temp = self.src[leaf].clone();
            temp.name = format!("node{}", self.next_temp);
            self.next_temp += 1;
            if !self.options.use_node_types {
                temp.acceptable_node_types = None;
            }
            self.out.add_child(new, temp)?;
        }

        let merged: Vec<NodeId> = nodes.iter().copied().filter(|n| self.is_included(*n)).collect();
        self.rollup_node(new, &merged, &leaves);
        self.add_node_time(new, nodes, &leaves);

        let temps = self.out.children(new)[true_children..].to_vec();
        for temp in temps.into_iter().rev() {
            if self.options.preserve_leaves && is_leaf_with_data(&self.out[temp]) {
                self.out[temp].name = self.out[new].name.clone();
            } else {
                self.out.remove(temp)?;
            }
        }
        // A single remaining leaf adds nothing.
        if true_children == 0 && self.out.children(new).len() == 1 {
            let temp = self.out.children(new)[0];
            self.out[new].acceptable_node_types = self.out[temp].acceptable_node_types.clone();
            self.out.remove(temp)?;
        }
        Ok(())
    }

    /// Sum values from the children, then take the union of assignees,
    /// dependencies, identifiers and node types of the merged sources.
    /// Assignees only come from `resources_for`.
    fn rollup_node(&mut self, id: NodeId, merged: &[NodeId], resources_for: &[NodeId]) {
        recalc_rollup_node(&mut self.out, id);

        let src = self.src;
        let mut assigned = BTreeSet::new();
        let mut dependencies: Vec<TaskDependency> = Vec::new();
        let mut id_lists = Vec::new();
        let mut node_types = BTreeSet::new();
        for &n in merged {
            let node = &src[n];
            if resources_for.contains(&n) {
                assigned.extend(node.assigned_to.iter().cloned());
            }
            for dep in &node.dependencies {
                if !dependencies.iter().any(|d| d.task_id == dep.task_id && d.kind == dep.kind) {
                    dependencies.push(dep.clone());
                }
            }
            id_lists.push(node.task_ids.as_slice());
            if let Some(t) = node.node_type.as_ref().filter(|t| !t.is_empty()) {
                node_types.insert(t.as_str());
            }
        }

        let use_node_types = self.options.use_node_types;
        let target = &mut self.out[id];
        target.assigned_to = assigned.into_iter().collect();
        target.dependencies = dependencies;
        target.task_ids = merge_task_id_lists(&id_lists);
        target.node_type = if use_node_types && !node_types.is_empty() {
            Some(node_types.into_iter().collect::<Vec<_>>().join(", "))
        } else {
            None
        };
    }

    /// Time logged directly against non-leaf source nodes, counted once on
    /// the merged node.
    fn add_node_time(&mut self, id: NodeId, nodes: &BTreeSet<NodeId>, leaves: &[NodeId]) {
        let mut extra = 0.0;
        for &n in nodes {
            if leaves.contains(&n) || !self.is_included(n) || self.src[n].is_user_pruned() {
                continue;
            }
            let below: f64 = self.src.children(n).iter().map(|c| self.src[*c].ev.actual_current_time).sum();
            let node_time = self.src[n].ev.actual_current_time - below;
            if node_time > 0.0 {
                extra += node_time;
            }
        }
        let ev = &mut self.out[id].ev;
        ev.actual_node_time += extra;
        ev.actual_time += extra;
        ev.actual_current_time += extra;
        ev.actual_direct_time += extra;
    }

    // === Naming and order ===

    fn name_for_root(&self, key: KeyId) -> (i64, String) {
        let name = self.root_child_name(key);
        (depth_first_ordinal(self.src, self.keys.task_ids(key)), name)
    }

    /// Canonical name when the source is a rollup and the resolver knows
    /// one, else the path of any source node.
    fn root_child_name(&self, key: KeyId) -> String {
        let nodes = self.keys.nodes(key);
        let root = self.src.root();
        let canonical = self
            .resolver
            .filter(|_| self.src[root].flag.as_deref() == Some(ROLLUP_LIST_FLAG))
            .and_then(|r| {
                best_task_ids(nodes.iter().map(|n| &self.src[*n]))
                    .and_then(|ids| r.canonical_task_name(ids.as_slice()))
                    .or_else(|| {
                        let ids: Vec<&String> = self.keys.task_ids(key).iter().collect();
                        r.canonical_task_name(ids.as_slice())
                    })
            });
        canonical.unwrap_or_else(|| {
            let Some(&first) = nodes.iter().next() else {
                return String::new();
            };
            let path = task_path(self.src, first);
            if path.is_empty() {
                self.src[first].name.clone()
            } else {
                path
            }
        })
    }

    /// Most common source name, and the average position of the source
    /// nodes among their siblings scaled by 1000.
    fn name_for_subtask(&self, key: KeyId) -> (i64, String) {
        let nodes = self.keys.nodes(key);
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for n in nodes {
            *counts.entry(self.src[*n].name.as_str()).or_default() += 1;
        }
        let best = counts.values().copied().max().unwrap_or_default();
        let name = counts.iter().find(|(_, c)| **c == best).map(|(n, _)| n.to_string()).unwrap_or_default();

        let positions: i64 = nodes
            .iter()
            .filter_map(|n| self.src.parent(*n).and_then(|p| self.src.child_index(p, *n)))
            .map(|i| i as i64)
            .sum();
        let ordinal = if nodes.is_empty() { 0 } else { positions * 1000 / nodes.len() as i64 };
        (ordinal, name)
    }

    // === Simplification ===

    fn simplify(&mut self, id: NodeId) -> Result<()> {
        let children = self.out.children(id).to_vec();
        for c in &children {
            self.simplify(*c)?;
        }
        let [child] = children[..] else {
            return Ok(());
        };

        let absorbed = self.out[child].clone();
        let node = &mut self.out[id];
        node.assigned_to = union_ordered(&node.assigned_to, &absorbed.assigned_to);
        node.task_ids = union_ordered(&node.task_ids, &absorbed.task_ids);
        for dep in absorbed.dependencies {
            if !node.dependencies.contains(&dep) {
                node.dependencies.push(dep);
            }
        }
        node.name = path_concat(&node.name, &absorbed.name);
        if node.baseline.start_date.is_none() {
            node.baseline.start_date = absorbed.baseline.start_date;
        }
        if node.baseline.date.is_none() {
            node.baseline.date = absorbed.baseline.date;
        }
        if node.baseline.time <= 0.0 {
            node.baseline.time = absorbed.baseline.time;
        }

        if let Some(from_child) = self.sources.remove(&child) {
            self.sources.entry(id).or_default().extend(from_child);
        }
        for grandchild in self.out.children(child).to_vec() {
            self.out.move_node(grandchild, id, None)?;
        }
        self.out.remove(child)?;
        Ok(())
    }
}

/// Admit the nodes in `filter` and every ancestor of one.
fn admit(tree: &TaskTree, id: NodeId, filter: &BTreeSet<NodeId>, admitted: &mut BTreeSet<NodeId>) -> bool {
    let mut below = false;
    for c in tree.children(id).iter().rev() {
        if admit(tree, *c, filter, admitted) {
            below = true;
        }
    }
    let include = below || filter.contains(&id);
    if include {
        admitted.insert(id);
    }
    include
}

/// 1-based pre-order position of the first node carrying one of `ids`.
fn depth_first_ordinal(tree: &TaskTree, ids: &BTreeSet<String>) -> i64 {
    if ids.is_empty() {
        return i64::MAX;
    }
    tree.pre_order(tree.root())
        .iter()
        .position(|n| tree[*n].task_ids.iter().any(|t| ids.contains(t)))
        .map_or(i64::MAX, |p| p as i64 + 1)
}

/// Path of `id` below the list that contains it.
fn task_path(tree: &TaskTree, id: NodeId) -> String {
    let mut parts = Vec::new();
    let mut cur = Some(id);
    while let Some(n) = cur {
        if n == tree.root() || tree[n].flag.is_some() {
            break;
        }
        parts.push(tree[n].name.as_str());
        cur = tree.parent(n);
    }
    parts.iter().rev().fold(String::new(), |mut acc, p| {
        acc.push('/');
        acc.push_str(p);
        acc
    })
}

/// Merge identifier lists, ordering each identifier by its average
/// position across the lists. Ties keep first-seen order.
fn merge_task_id_lists(lists: &[&[String]]) -> Vec<String> {
    let mut stats: Vec<(&String, usize, usize)> = Vec::new();
    for list in lists {
        for (pos, id) in list.iter().enumerate() {
            match stats.iter_mut().find(|s| s.0 == id) {
                Some(s) => {
                    s.1 += pos;
                    s.2 += 1;
                }
                None => stats.push((id, pos, 1)),
            }
        }
    }
    let average = |s: &(&String, usize, usize)| s.1 as f64 / s.2 as f64;
    stats.sort_by(|a, b| average(a).total_cmp(&average(b)));
    stats.into_iter().map(|s| s.0.clone()).collect()
}

fn union_ordered(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = a.to_vec();
    for x in b {
        if !out.contains(x) {
            out.push(x.clone());
        }
    }
    out
}

fn is_leaf_with_data(node: &TaskNode) -> bool {
    node.ev.plan_time > 0.0 || node.ev.actual_time > 0.0 || node.node_type.as_ref().is_some_and(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use evman_calc::CalculatorConfig;
    use evman_core::Time;
    use evman_deps::{HierarchyEntry, ManualClock, ResolverConfig, SourceList, StaticSource, TemplateKind};
    use evman_schedule::Schedule;

    fn t(day: u32) -> Time {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn schedule() -> Schedule {
        Schedule::from_rows(t(1), [(t(8), 600.0), (t(15), 600.0), (t(22), 600.0), (t(29), 600.0)])
    }

    /// A person's list of `(id, name, plan minutes)` top-level tasks.
    fn person(name: &str, tasks: &[(&str, &str, f64)]) -> TaskList {
        let mut tree = TaskTree::new(TaskNode::new(name));
        let root = tree.root();
        for (id, task, plan) in tasks {
            tree.add_child(root, TaskNode::new(*task).with_task_id(*id).with_plan(*plan).with_assignee(name))
                .unwrap();
        }
        TaskList::new(name, tree, schedule(), CalculatorConfig::default())
    }

    fn alice_and_bob() -> TaskList {
        let alice = person("alice", &[("T1", "Design", 60.0), ("T2", "Code", 120.0), ("T3", "Test", 60.0)]);
        let bob = person("bob", &[("T1", "Design", 30.0), ("T2", "Code", 90.0)]);
        let mut team = TaskList::rollup("Team", vec![alice, bob], CalculatorConfig::rollup(), t(10));
        team.recalc_at(t(10));
        team
    }

    fn top_level(merged: &MergedTree) -> Vec<(String, f64)> {
        let tree = merged.tree();
        tree.children(tree.root()).iter().map(|c| (tree[*c].name.clone(), tree[*c].ev.plan_time)).collect()
    }

    #[test]
    fn test_alice_and_bob_merge_into_three_tasks() {
        let team = alice_and_bob();
        let merged = TaskListMerger::default().merge(&team).unwrap();
        assert_eq!(
            top_level(&merged),
            [("/Design".to_string(), 90.0), ("/Code".to_string(), 210.0), ("/Test".to_string(), 60.0)]
        );
        let tree = merged.tree();
        let root = tree.root();
        assert_eq!(tree[root].flag.as_deref(), Some(MERGED_LIST_FLAG));
        assert_eq!(tree[root].ev.plan_time, 360.0);
        let design = tree.children(root)[0];
        assert!(tree.is_leaf(design));
        assert_eq!(tree[design].assigned_to, ["alice", "bob"]);
        assert_eq!(tree[design].task_ids, ["T1"]);
        assert_eq!(merged.sources(design).map(BTreeSet::len), Some(2));
        assert_eq!(merged.tasks_merged_beneath(root).len(), 5);
    }

    #[test]
    fn test_preserve_leaves_keeps_each_contributor() {
        let team = alice_and_bob();
        let merged = TaskListMerger::new(MergeOptions::new().with_preserve_leaves(true)).merge(&team).unwrap();
        let tree = merged.tree();
        let root = tree.root();
        let design = tree.children(root)[0];
        let leaves: Vec<(&str, &[String], f64)> = tree
            .children(design)
            .iter()
            .map(|c| (tree[*c].name.as_str(), tree[*c].assigned_to.as_slice(), tree[*c].ev.plan_time))
            .collect();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0, "/Design");
        assert_eq!(leaves[0].1, ["alice"]);
        assert_eq!(leaves[1].1, ["bob"]);
        assert_eq!(leaves[1].2, 30.0);
        // Test has a single contributor, so its leaf is collapsed.
        let test = tree.children(root)[2];
        assert!(tree.is_leaf(test));
    }

    #[test]
    fn test_same_named_siblings_merge_without_ids() {
        let mut a = TaskTree::new(TaskNode::new("a"));
        let w = a.add_child(a.root(), TaskNode::new("Widget")).unwrap();
        a.add_child(w, TaskNode::new("Code").with_plan(10.0)).unwrap();
        let mut b = TaskTree::new(TaskNode::new("b"));
        let w = b.add_child(b.root(), TaskNode::new("Widget")).unwrap();
        b.add_child(w, TaskNode::new("Code").with_plan(20.0)).unwrap();
        b.add_child(w, TaskNode::new("Docs").with_plan(5.0)).unwrap();
        let lists = vec![
            TaskList::new("a", a, schedule(), CalculatorConfig::default()),
            TaskList::new("b", b, schedule(), CalculatorConfig::default()),
        ];
        let mut team = TaskList::rollup("Team", lists, CalculatorConfig::rollup(), t(10));
        team.recalc_at(t(10));

        let merged = TaskListMerger::default().merge(&team).unwrap();
        let tree = merged.tree();
        let widget = tree.find_child_named(tree.root(), "/Widget").unwrap();
        let names: Vec<&str> = tree.children(widget).iter().map(|c| tree[*c].name.as_str()).collect();
        assert_eq!(names, ["Code", "Docs"]);
        assert_eq!(tree[widget].ev.plan_time, 35.0);
    }

    #[test]
    fn test_simplify_collapses_single_child_chains() {
        let mut tree = TaskTree::new(TaskNode::new("solo"));
        let root = tree.root();
        let proj = tree.add_child(root, TaskNode::new("Proj").with_task_id("P")).unwrap();
        tree.add_child(proj, TaskNode::new("Design").with_task_id("D").with_plan(40.0)).unwrap();
        tree.add_child(root, TaskNode::new("Docs").with_task_id("X").with_plan(10.0)).unwrap();
        let mut list = TaskList::new("solo", tree, schedule(), CalculatorConfig::default());
        list.recalc_at(t(10));

        let merged = TaskListMerger::new(MergeOptions::new().with_simplify(true)).merge(&list).unwrap();
        let out = merged.tree();
        let names: Vec<&str> = out.children(out.root()).iter().map(|c| out[*c].name.as_str()).collect();
        assert_eq!(names, ["/Proj/Design", "/Docs"]);
        let chain = out.children(out.root())[0];
        assert_eq!(out[chain].task_ids, ["P", "D"]);
        assert_eq!(out[chain].ev.plan_time, 40.0);
        assert_eq!(merged.sources(chain).map(BTreeSet::len), Some(2));
    }

    #[test]
    fn test_filter_admits_ancestors_only_as_containers() {
        let team = alice_and_bob();
        let tree = team.tree();
        let alice_code = tree.find_by_path("/alice/Code").unwrap();
        let merged = TaskListMerger::new(MergeOptions::new().with_filter([alice_code])).merge(&team).unwrap();
        assert_eq!(top_level(&merged), [("/Code".to_string(), 120.0)]);
    }

    #[test]
    fn test_canonical_names_for_rollup_roots() {
        let source = StaticSource {
            hierarchy: vec![HierarchyEntry {
                path: "/Project/Design".into(),
                task_ids: vec!["T1".into()],
                template: TemplateKind::Team,
            }],
            lists: Vec::<SourceList>::new(),
        };
        let clock = Arc::new(ManualClock::new(t(10)));
        let resolver = Arc::new(DependencyResolver::with_clock(Arc::new(source), ResolverConfig::default(), clock));
        let team = alice_and_bob();
        let merged = TaskListMerger::default().with_resolver(resolver).merge(&team).unwrap();
        let names: Vec<String> = top_level(&merged).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["/Project/Design", "/Code", "/Test"]);
    }

    #[test]
    fn test_node_time_counted_once() {
        let mut tree = TaskTree::new(TaskNode::new("solo"));
        let root = tree.root();
        let parent = tree.add_child(root, TaskNode::new("Feature").with_task_id("F").with_time(t(3), 30.0)).unwrap();
        tree.add_child(parent, TaskNode::new("Code").with_task_id("C").with_plan(60.0).with_time(t(4), 45.0)).unwrap();
        let mut list = TaskList::new("solo", tree, schedule(), CalculatorConfig::default());
        list.recalc_at(t(10));

        let merged = TaskListMerger::default().merge(&list).unwrap();
        let out = merged.tree();
        let feature = out.children(out.root())[0];
        assert_eq!(out[feature].ev.actual_node_time, 30.0);
        assert_eq!(out[feature].ev.actual_time, 75.0);
    }

    #[test]
    fn test_baseline_merged_and_cached() {
        let mut team = alice_and_bob();
        let snapshot = Arc::new(team.snapshot("plan", t(10)));
        team.set_baseline(Some(Arc::clone(&snapshot)));
        team.recalc_at(t(11));

        let mut merger = TaskListMerger::default();
        let merged = merger.merge(&team).unwrap();
        let tree = merged.tree();
        let code = tree.children(tree.root())[1];
        assert_eq!(tree[code].baseline.time, 210.0);
        let cached = merger.baseline.as_ref().map(|(id, _)| *id);
        assert_eq!(cached, Some(snapshot.id));

        let again = merger.merge(&team).unwrap();
        assert_eq!(again, merged);
    }

    #[test]
    fn test_merge_task_id_lists_orders_by_average_position() {
        let a = vec!["M".to_string(), "T".to_string()];
        let b = vec!["T".to_string(), "M".to_string(), "X".to_string()];
        let c = vec!["T".to_string()];
        assert_eq!(merge_task_id_lists(&[&a, &b, &c]), ["T", "M", "X"]);
    }

    #[test]
    fn test_empty_list_merges_to_bare_root() {
        let mut list = TaskList::new("solo", TaskTree::new(TaskNode::new("solo")), schedule(), CalculatorConfig::default());
        list.recalc_at(t(10));
        let merged = TaskListMerger::default().merge(&list).unwrap();
        let tree = merged.tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[tree.root()].name, "solo");
        assert!(merged.tasks_merged_beneath(tree.root()).is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn list(name: &str, tasks: &[(u8, u8, u16)]) -> TaskList {
            let mut tree = TaskTree::new(TaskNode::new(name));
            let root = tree.root();
            let mut parents = vec![root];
            for (id, parent, plan) in tasks {
                let under = parents[*parent as usize % parents.len()];
                let node = TaskNode::new(format!("Task {}", id % 6)).with_task_id(format!("T{id}")).with_plan(*plan as f64);
                if let Ok(added) = tree.add_child(under, node.with_assignee(name)) {
                    parents.push(added);
                }
            }
            TaskList::new(name, tree, schedule(), CalculatorConfig::default())
        }

        fn tasks() -> impl Strategy<Value = Vec<(u8, u8, u16)>> {
            prop::collection::vec((0u8..12, any::<u8>(), 0u16..500), 0..10)
        }

        proptest! {
            #[test]
            fn prop_merge_is_deterministic(a in tasks(), b in tasks(), preserve in any::<bool>(), simplify in any::<bool>()) {
                let build = || {
                    let mut team = TaskList::rollup("Team", vec![list("ann", &a), list("bo", &b)], CalculatorConfig::rollup(), t(10));
                    team.recalc_at(t(10));
                    team
                };
                let options = MergeOptions::new().with_preserve_leaves(preserve).with_simplify(simplify);
                let first = TaskListMerger::new(options.clone()).merge(&build()).unwrap();
                let second = TaskListMerger::new(options).merge(&build()).unwrap();
                prop_assert_eq!(
                    serde_json::to_string(first.tree()).unwrap(),
                    serde_json::to_string(second.tree()).unwrap()
                );
            }

            #[test]
            fn prop_every_leaf_counted_once(a in tasks(), b in tasks()) {
                let mut team = TaskList::rollup("Team", vec![list("ann", &a), list("bo", &b)], CalculatorConfig::rollup(), t(10));
                team.recalc_at(t(10));
                let merged = TaskListMerger::default().merge(&team).unwrap();
                let (src, out) = (team.tree(), merged.tree());
                let planned: f64 = src
                    .leaves(src.root())
                    .into_iter()
                    .filter(|l| src[*l].flag.is_none())
                    .map(|l| src[l].ev.plan_time)
                    .sum();
                prop_assert!((out[out.root()].ev.plan_time - planned).abs() < 1e-6);
            }
        }
    }
}
