//! The immutable resolver index.
//!
//! An index is built in one go and never modified afterwards. The resolver
//! replaces the whole index on refresh, so readers holding an older one
//! keep a consistent view.

use crate::source::{HierarchyEntry, SourceList, TaskListSource};
use evman_core::{min_start_date, ComparisonDate, EvDate, NodeId, TaskTree, Time};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Prefix of the pseudo task identifier naming a whole task list.
pub const PSEUDO_TASK_PREFIX: &str = "TL-";

/// Pseudo task identifier for the list with identifier `list_id`.
pub fn pseudo_task_id(list_id: &str) -> String {
    format!("{PSEUDO_TASK_PREFIX}{list_id}")
}

/// Names ranked by preference, best first. A name is kept once, with the
/// preference it was first added with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranked {
    entries: Vec<(i64, String)>,
}

impl Ranked {
    fn add(&mut self, name: &str, preference: i64) {
        if self.entries.iter().any(|(_, n)| n == name) {
            return;
        }
        self.entries.push((preference, name.to_string()));
        self.entries.sort_by(|a, b| Reverse(a.0).cmp(&Reverse(b.0)).then_with(|| a.1.cmp(&b.1)));
    }

    /// The most preferred name.
    pub fn best(&self) -> Option<&str> {
        self.entries.first().map(|(_, n)| n.as_str())
    }

    /// All names, best first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, n)| n.as_str())
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// People waiting on a task, with the earliest date each needs it.
pub type Waiting = BTreeMap<String, Option<EvDate>>;

/// Hierarchy part of the index: canonical task names.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    names: BTreeMap<String, Ranked>,
}

impl NameIndex {
    /// Index the hierarchy. Within a node, earlier identifiers rank higher.
    pub fn build(hierarchy: &[HierarchyEntry]) -> Self {
        let mut names: BTreeMap<String, Ranked> = BTreeMap::new();
        for entry in hierarchy {
            let mut preference = entry.template.preference();
            for id in &entry.task_ids {
                names.entry(id.clone()).or_default().add(&entry.path, preference);
                preference -= 1;
            }
        }
        Self { names }
    }

    /// Canonical path of `task_id`.
    pub fn canonical_name(&self, task_id: &str) -> Option<&str> {
        self.names.get(task_id).and_then(Ranked::best)
    }

    /// Every path defining `task_id`, best first.
    pub fn names(&self, task_id: &str) -> Vec<String> {
        self.names.get(task_id).map(|r| r.names().map(str::to_string).collect()).unwrap_or_default()
    }

    /// Number of indexed identifiers.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Task-list part of the index.
#[derive(Debug, Clone, Default)]
pub struct ListIndex {
    tasks: BTreeMap<String, Ranked>,
    lists: BTreeSet<String>,
    reverse: BTreeMap<String, Waiting>,
    people: BTreeMap<String, BTreeSet<String>>,
}

impl ListIndex {
    /// Open every list named by `source`, plus every list known from
    /// `previous`, and index their tasks.
    pub fn build(source: &dyn TaskListSource, previous: Option<&ListIndex>) -> Self {
        let mut index = Self::default();
        let mut names: Vec<String> = previous.map(|p| p.lists.iter().cloned().collect()).unwrap_or_default();
        names.extend(source.list_names());
        for name in names {
            if index.lists.contains(&name) {
                continue;
            }
            if let Some(list) = source.open(&name) {
                index.register_list(&list);
            }
        }
        index
    }

    fn register_list(&mut self, list: &SourceList) {
        if !self.lists.insert(list.name.clone()) {
            return;
        }
        let preference = list_preference(&list.tree);
        let root = list.tree.root();
        self.register_tasks(&list.tree, root, &list.name, preference);
        if let Some(id) = &list.id {
            self.tasks.entry(pseudo_task_id(id)).or_default().add(&list.name, preference);
        }
        for sub in list.sub_lists.iter().rev() {
            self.register_list(sub);
        }
    }

    fn register_tasks(&mut self, tree: &TaskTree, id: NodeId, list: &str, preference: i64) {
        let node = &tree[id];
        for task_id in &node.task_ids {
            self.tasks.entry(task_id.clone()).or_default().add(list, preference);
            self.people.entry(task_id.clone()).or_default().extend(node.assigned_to.iter().cloned());
        }
        for dep in node.dependencies.iter().filter(|d| !d.task_id.is_empty()) {
            let mut who: Vec<&String> = node.assigned_to.iter().collect();
            if who.is_empty() {
                who = assigned_below(tree, id);
            }
            if who.is_empty() {
                continue;
            }
            let need = ComparisonDate::default().of(node, true);
            let waiting = self.reverse.entry(dep.task_id.clone()).or_default();
            for person in who {
                merge_waiting(waiting, person, need);
            }
        }
        for c in tree.children(id).iter().rev() {
            self.register_tasks(tree, *c, list, preference);
        }
    }

    /// Lists defining `task_id`, most preferred first.
    pub fn lists_containing(&self, task_id: &str) -> Vec<String> {
        self.tasks.get(task_id).map(|r| r.names().map(str::to_string).collect()).unwrap_or_default()
    }

    /// People waiting on `task_id`.
    pub fn waiting_on(&self, task_id: &str) -> Option<&Waiting> {
        self.reverse.get(task_id)
    }

    /// People assigned to `task_id` anywhere.
    pub fn assigned_to(&self, task_id: &str) -> Option<&BTreeSet<String>> {
        self.people.get(task_id)
    }

    /// Names of the indexed lists.
    pub fn list_names(&self) -> impl Iterator<Item = &str> {
        self.lists.iter().map(String::as_str)
    }
}

/// A complete resolver index.
#[derive(Debug, Clone, Default)]
pub struct ResolverIndex {
    /// Canonical names from the hierarchy.
    pub names: NameIndex,
    /// Task lists and dependencies.
    pub lists: ListIndex,
    /// When the list part was built.
    pub lists_built_at: Option<Time>,
    /// When the name part was built.
    pub names_built_at: Option<Time>,
}

impl ResolverIndex {
    /// Build a fresh index. The name part is carried over from `previous`
    /// unless `rebuild_names` is set.
    pub fn build(source: &dyn TaskListSource, previous: &ResolverIndex, rebuild_names: bool, now: Time) -> Self {
        let (names, names_built_at) = if rebuild_names {
            (NameIndex::build(&source.hierarchy()), Some(now))
        } else {
            (previous.names.clone(), previous.names_built_at)
        };
        let lists = ListIndex::build(source, Some(&previous.lists));
        debug!(
            task_ids = names.len(),
            lists = lists.lists.len(),
            reverse = lists.reverse.len(),
            "resolver index rebuilt"
        );
        Self { names, lists, lists_built_at: Some(now), names_built_at }
    }
}

/// Preference of a list: people count times 10000 plus identifier count.
pub fn list_preference(tree: &TaskTree) -> i64 {
    let mut people = BTreeSet::new();
    let mut ids = BTreeSet::new();
    for id in tree.pre_order(tree.root()) {
        people.extend(tree[id].assigned_to.iter());
        ids.extend(tree[id].task_ids.iter());
    }
    people.len() as i64 * 10_000 + ids.len() as i64
}

fn assigned_below(tree: &TaskTree, id: NodeId) -> Vec<&String> {
    let mut who: BTreeSet<&String> = BTreeSet::new();
    for d in tree.pre_order(id) {
        who.extend(tree[d].assigned_to.iter());
    }
    who.into_iter().collect()
}

/// Record that `person` needs the task by `date`, keeping the earliest.
pub fn merge_waiting(dest: &mut Waiting, person: &str, date: Option<EvDate>) {
    let merged = match dest.get(person) {
        Some(old) => min_start_date(*old, date),
        None => date,
    };
    dest.insert(person.to_string(), merged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{StaticSource, TemplateKind};
    use evman_core::{TaskDependency, TaskNode, DAY_MILLIS};

    fn day(n: i64) -> EvDate {
        EvDate::from_millis(1_700_000_000_000 + n * DAY_MILLIS)
    }

    #[test]
    fn test_ranked_prefers_higher_then_name() {
        let mut r = Ranked::default();
        r.add("b", 5);
        r.add("a", 5);
        r.add("c", 9);
        r.add("a", 100);
        assert_eq!(r.names().collect::<Vec<_>>(), ["c", "a", "b"]);
        assert_eq!(r.best(), Some("c"));
    }

    #[test]
    fn test_name_index_prefers_master_projects() {
        let hierarchy = vec![
            HierarchyEntry { path: "/Indiv/Widget".into(), task_ids: vec!["W:1".into()], template: TemplateKind::Individual },
            HierarchyEntry { path: "/Master/Widget".into(), task_ids: vec!["W:1".into()], template: TemplateKind::Master },
            HierarchyEntry { path: "/Team/Widget".into(), task_ids: vec!["W:1".into()], template: TemplateKind::Team },
        ];
        let names = NameIndex::build(&hierarchy);
        assert_eq!(names.canonical_name("W:1"), Some("/Master/Widget"));
        assert_eq!(names.canonical_name("W:2"), None);
    }

    #[test]
    fn test_list_preference_counts_people_and_ids() {
        let mut tree = TaskTree::new(TaskNode::new("L"));
        let root = tree.root();
        tree.add_child(root, TaskNode::new("A").with_task_id("1").with_assignee("ann")).unwrap();
        tree.add_child(root, TaskNode::new("B").with_task_id("2").with_assignee("bob")).unwrap();
        tree.add_child(root, TaskNode::new("C").with_task_id("2")).unwrap();
        assert_eq!(list_preference(&tree), 20_002);
    }

    #[test]
    fn test_reverse_edges_keep_earliest_need_date() {
        let mut tree = TaskTree::new(TaskNode::new("L"));
        let root = tree.root();
        let mut a = TaskNode::new("A").with_assignee("ann");
        a.dependencies.push(TaskDependency::new("X:1", None));
        a.ev.plan_date = Some(day(5));
        let mut b = TaskNode::new("B");
        b.dependencies.push(TaskDependency::new("X:1", None));
        b.ev.plan_date = Some(day(3));
        let a = tree.add_child(root, a).unwrap();
        let b = tree.add_child(a, b).unwrap();
        tree[b].assigned_to.push("ann".into());

        let source = StaticSource { hierarchy: Vec::new(), lists: vec![SourceList::new("L", tree)] };
        let index = ListIndex::build(&source, None);
        let waiting = index.waiting_on("X:1").unwrap();
        assert_eq!(waiting.get("ann"), Some(&Some(day(3))));
    }
}
