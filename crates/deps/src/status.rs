//! Resolved status of task dependencies.
//!
//! [`DependencyUpdater`] walks a task tree, opens the task lists that define
//! the targets of its dependencies and records who is working on each
//! target, how far along it is and when it is projected to finish. It also
//! adds the reverse edges ("who is waiting on this task") and collaboration
//! edges the resolver knows about.

use crate::index::pseudo_task_id;
use crate::resolver::{split_task_id, DependencyResolver};
use crate::source::SourceList;
use evman_calc::DependencyHook;
use evman_core::{
    max_plan_date, ComparisonDate, DependencyKind, EvDate, NodeId, TaskDependency, TaskNode, TaskTree,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Lists opened during one update, by name. `None` records a failed open.
type OpenLists = BTreeMap<String, Option<SourceList>>;

/// Join two paths with exactly one slash between them.
pub fn path_concat(a: &str, b: &str) -> String {
    if b.is_empty() {
        a.to_string()
    } else if a.is_empty() {
        b.to_string()
    } else if b.starts_with('/') {
        format!("{a}{b}")
    } else {
        format!("{a}/{b}")
    }
}

/// The task identifiers that describe `nodes` best.
///
/// Only identifiers that occur most often count, and with more than one node
/// they must occur at least twice. Ties go to the identifiers listed
/// earliest on the nodes. Returns `None` when no identifier qualifies.
pub fn best_task_ids<'a>(nodes: impl IntoIterator<Item = &'a TaskNode>) -> Option<Vec<String>> {
    let nodes: Vec<&TaskNode> = nodes.into_iter().collect();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for node in &nodes {
        for id in &node.task_ids {
            *counts.entry(id.as_str()).or_default() += 1;
        }
    }
    let best_count = counts.values().copied().max()?;
    if best_count < 2 && nodes.len() > 1 {
        return None;
    }
    let best: Vec<&str> = counts.iter().filter(|(_, c)| **c == best_count).map(|(id, _)| *id).collect();
    if best.len() < 2 {
        return Some(best.into_iter().map(str::to_string).collect());
    }

    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
    for node in &nodes {
        let listed = node.task_ids.iter().map(String::as_str).filter(|id| best.contains(id));
        for (pos, id) in listed.enumerate() {
            *positions.entry(id).or_default() += pos;
        }
    }
    let lowest = positions.values().copied().min()?;
    Some(positions.into_iter().filter(|(_, p)| *p == lowest).map(|(id, _)| id.to_string()).collect())
}

/// Refreshes the resolved state of dependencies.
#[derive(Debug, Clone)]
pub struct DependencyUpdater {
    resolver: Arc<DependencyResolver>,
    owner: Vec<String>,
    comparison: ComparisonDate,
    collaborators: bool,
}

impl DependencyUpdater {
    /// An updater resolving through `resolver`.
    pub fn new(resolver: Arc<DependencyResolver>) -> Self {
        Self { resolver, owner: Vec::new(), comparison: ComparisonDate::default(), collaborators: false }
    }

    /// Builder: people who own the trees being updated. They are left out of
    /// reverse and collaboration edges.
    pub fn with_owner<I, S>(mut self, owner: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owner = owner.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: which date of a dependent task is compared.
    pub fn with_comparison(mut self, comparison: ComparisonDate) -> Self {
        self.comparison = comparison;
        self
    }

    /// Builder: add collaboration edges.
    pub fn with_collaborators(mut self, enabled: bool) -> Self {
        self.collaborators = enabled;
        self
    }

    /// Update every dependency in `tree`, which is the task list
    /// `task_list`. Returns the number of dependencies resolved.
    pub fn update_tree(&self, task_list: &str, tree: &mut TaskTree) -> usize {
        let mut lists = OpenLists::new();
        lists.insert(task_list.to_string(), Some(SourceList::new(task_list, tree.clone())));

        let order = tree.pre_order(tree.root());
        for &id in &order {
            for dep in tree[id].dependencies.iter_mut().filter(|d| d.kind == DependencyKind::Normal) {
                self.open_for(&mut lists, dep);
            }
        }

        let mut resolved = 0;
        for id in order {
            let mut deps = std::mem::take(&mut tree[id].dependencies);
            for dep in deps.iter_mut().filter(|d| d.kind == DependencyKind::Normal) {
                self.update_dependency(&lists, dep);
                resolved += 1;
            }
            deps.retain(|d| d.kind == DependencyKind::Normal);
            self.add_reverse_and_collab(&tree[id], &mut deps);
            for dep in &mut deps {
                dep.load_parent_date(&tree[id], self.comparison);
            }
            tree[id].dependencies = deps;
        }
        debug!(task_list, resolved, lists = lists.len(), "dependencies updated");
        resolved
    }

    /// Update a standalone collection of dependencies.
    pub fn update(&self, deps: &mut [TaskDependency]) {
        let mut lists = OpenLists::new();
        for dep in deps.iter_mut() {
            self.open_for(&mut lists, dep);
        }
        for dep in deps.iter_mut() {
            self.update_dependency(&lists, dep);
        }
    }

    // Prefer the list the dependency already names, else the best list
    // containing the target.
    fn open_for(&self, lists: &mut OpenLists, dep: &mut TaskDependency) {
        if let Some(name) = dep.status.task_list_name.clone() {
            if self.open_list(lists, &name) {
                return;
            }
        }
        if let Some(name) = self.resolver.task_lists_containing(&dep.task_id).into_iter().next() {
            self.open_list(lists, &name);
            dep.status.task_list_name = Some(name);
        }
    }

    fn open_list(&self, lists: &mut OpenLists, name: &str) -> bool {
        if let Some(opened) = lists.get(name) {
            return opened.is_some();
        }
        let opened = self.resolver.source().open(name);
        let ok = opened.is_some();
        lists.insert(name.to_string(), opened);
        ok
    }

    fn update_dependency(&self, lists: &OpenLists, dep: &mut TaskDependency) {
        let mut assigned_to = dep.status.assigned_to.clone();
        let mut percent_complete = dep.status.percent_complete;
        let mut projected = dep.status.projected_date;
        let mut unresolvable = assigned_to.is_none() && percent_complete == 0.0;
        let mut display_name = dep.display_name.clone();

        let list = dep.status.task_list_name.as_ref().and_then(|n| lists.get(n)).and_then(Option::as_ref);
        if let Some(list) = list {
            let mut c = StatusCollector::new(&dep.task_id, list, self.comparison);
            c.visit(&list.tree, list.tree.root());
            if c.found {
                unresolvable = false;
                assigned_to = c.assigned_to();
                percent_complete = c.percent_complete();
                projected = c.projected;
                display_name = Some(c.display_name(&list.tree, &self.resolver));
            }
        }
        dep.set_resolved_details(unresolvable, assigned_to, percent_complete, projected, display_name);
    }

    fn add_reverse_and_collab(&self, node: &TaskNode, deps: &mut Vec<TaskDependency>) {
        if node.task_ids.is_empty() {
            return;
        }
        let waiting = self.resolver.individuals_waiting_on(&node.task_ids, &self.owner);
        if !waiting.is_empty() {
            deps.push(TaskDependency::reverse(&waiting));
        }
        if self.collaborators {
            let mut ignore = self.owner.clone();
            ignore.extend(node.assigned_to.iter().cloned());
            let people = self.resolver.collaborators(&node.task_ids, &ignore);
            if !people.is_empty() {
                deps.push(TaskDependency::collab(&people));
            }
        }
    }
}

impl DependencyHook for DependencyUpdater {
    fn refresh(&self, task_list: &str, tree: &mut TaskTree) {
        self.update_tree(task_list, tree);
    }
}

/// Collects the status of one dependency target within a task list.
struct StatusCollector<'a> {
    task_id: &'a str,
    extra_path: Option<&'a str>,
    pseudo_id: Option<String>,
    root_display: String,
    comparison: ComparisonDate,
    collecting: bool,
    found: bool,
    display: Option<String>,
    people: BTreeSet<String>,
    task_count: usize,
    completed_count: usize,
    plan_value: f64,
    completed_value: f64,
    projected: Option<EvDate>,
    canonical_roots: Vec<NodeId>,
}

impl<'a> StatusCollector<'a> {
    fn new(task_id: &'a str, list: &SourceList, comparison: ComparisonDate) -> Self {
        let (task_id, extra_path) = split_task_id(task_id).unwrap_or((task_id, None));
        Self {
            task_id,
            extra_path,
            pseudo_id: list.id.as_deref().map(pseudo_task_id),
            root_display: format!("/{}", list.name),
            comparison,
            collecting: false,
            found: false,
            display: None,
            people: BTreeSet::new(),
            task_count: 0,
            completed_count: 0,
            plan_value: 0.0,
            completed_value: 0.0,
            projected: None,
            canonical_roots: Vec::new(),
        }
    }

    fn visit(&mut self, tree: &TaskTree, id: NodeId) {
        let matched = self.is_task_match(tree, id);
        if matched {
            self.display = self.display_name_for(tree, id);
            self.found = true;
            self.collecting = true;
            self.plan_value += tree[id].ev.plan_value;
            self.completed_value += tree[id].ev.value_earned;
        }
        if tree.is_leaf(id) {
            self.leaf(&tree[id]);
        } else {
            for c in tree.children(id).iter().rev() {
                self.visit(tree, *c);
            }
        }
        if matched {
            self.collecting = false;
        }
    }

    fn leaf(&mut self, node: &TaskNode) {
        if !self.collecting || node.is_totally_pruned() {
            return;
        }
        self.people.extend(node.assigned_to.iter().cloned());
        self.projected = max_plan_date(self.projected, self.comparison.of(node, true));
        self.task_count += 1;
        if node.date_completed.is_some() {
            self.completed_count += 1;
        }
    }

    fn is_id_match(&self, node: &TaskNode) -> bool {
        if !node.task_ids.is_empty() {
            node.task_ids.iter().any(|id| id == self.task_id)
        } else if node.flag.is_some() {
            self.pseudo_id.as_deref() == Some(self.task_id)
        } else {
            false
        }
    }

    fn is_task_match(&self, tree: &TaskTree, id: NodeId) -> bool {
        self.extra_path_matches(tree, self.extra_path.unwrap_or_default(), id)
    }

    fn extra_path_matches(&self, tree: &TaskTree, extra: &str, id: NodeId) -> bool {
        if extra.is_empty() {
            return self.is_id_match(&tree[id]);
        }
        let Some(parent) = tree.parent(id).filter(|_| tree[id].flag.is_none()) else {
            return false;
        };
        let name = &tree[id].name;
        let tail = if name.starts_with('/') { name.clone() } else { format!("/{name}") };
        match extra.strip_suffix(tail.as_str()) {
            Some(rest) => self.extra_path_matches(tree, rest, parent),
            None => false,
        }
    }

    // Path below the topmost unflagged ancestor, which is remembered so the
    // display name can start from its canonical name.
    fn display_name_for(&mut self, tree: &TaskTree, id: NodeId) -> Option<String> {
        if tree[id].flag.is_some() {
            return None;
        }
        let parent_name = tree.parent(id).and_then(|p| self.display_name_for(tree, p));
        match parent_name {
            Some(parent) => Some(format!("{parent}/{}", tree[id].name)),
            None => {
                self.canonical_roots.push(id);
                Some(String::new())
            }
        }
    }

    fn percent_complete(&self) -> f64 {
        if self.plan_value > 0.0 {
            // Incomplete tasks with no planned time keep it short of done.
            if self.plan_value == self.completed_value && self.task_count > self.completed_count {
                0.99
            } else {
                self.completed_value / self.plan_value
            }
        } else if self.task_count > 0 {
            self.completed_count as f64 / self.task_count as f64
        } else {
            0.0
        }
    }

    fn assigned_to(&self) -> Option<String> {
        if self.people.is_empty() {
            None
        } else {
            Some(self.people.iter().map(String::as_str).collect::<Vec<_>>().join(", "))
        }
    }

    fn display_name(&self, tree: &TaskTree, resolver: &DependencyResolver) -> String {
        let display = self.display.as_deref().unwrap_or_default();
        let Some(&first) = self.canonical_roots.first() else {
            return path_concat(&self.root_display, display);
        };
        let canonical = best_task_ids(self.canonical_roots.iter().map(|id| &tree[*id]))
            .and_then(|ids| resolver.canonical_task_name(&ids));
        let root = canonical.unwrap_or_else(|| path_concat(&self.root_display, &tree[first].name));
        path_concat(&root, display)
    }
}
