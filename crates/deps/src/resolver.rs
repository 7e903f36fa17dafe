//! The dependency resolver service.

use crate::config::{Clock, ResolverConfig, SystemClock};
use crate::index::{merge_waiting, ResolverIndex, Waiting};
use crate::source::TaskListSource;
use evman_core::Time;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::info;

/// A task identifier, optionally followed by a path below that task.
fn task_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([^/]+)(/.*)?$").ok()).as_ref()
}

/// Split `task_id` into the identifier and the extra path after it.
pub fn split_task_id(task_id: &str) -> Option<(&str, Option<&str>)> {
    let caps = task_id_pattern()?.captures(task_id)?;
    let id = caps.get(1)?.as_str();
    Some((id, caps.get(2).map(|m| m.as_str())))
}

/// Answers which task lists define a task, what a task is canonically
/// called and who is waiting on it.
///
/// The index is rebuilt when its TTL has run out and swapped in whole.
/// Readers get an `Arc` to the index current at the time of the call.
pub struct DependencyResolver {
    source: Arc<dyn TaskListSource>,
    clock: Arc<dyn Clock>,
    config: ResolverConfig,
    index: RwLock<Arc<ResolverIndex>>,
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.snapshot();
        f.debug_struct("DependencyResolver")
            .field("config", &self.config)
            .field("lists_built_at", &index.lists_built_at)
            .field("names_built_at", &index.names_built_at)
            .finish()
    }
}

impl DependencyResolver {
    /// A resolver over `source` using the system clock.
    pub fn new(source: Arc<dyn TaskListSource>, config: ResolverConfig) -> Self {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    /// A resolver with an explicit clock.
    pub fn with_clock(source: Arc<dyn TaskListSource>, config: ResolverConfig, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock, config, index: RwLock::new(Arc::new(ResolverIndex::default())) }
    }

    /// The data source.
    pub fn source(&self) -> &dyn TaskListSource {
        self.source.as_ref()
    }

    /// The current index, without refreshing.
    pub fn snapshot(&self) -> Arc<ResolverIndex> {
        match self.index.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Rebuild the task-list part of the index, and the name part when its
    /// TTL has run out, then swap it in.
    pub fn refresh(&self, now: Time) -> Arc<ResolverIndex> {
        let previous = self.snapshot();
        let rebuild_names = ResolverConfig::is_stale(self.config.static_ttl, previous.names_built_at, now);
        let fresh = Arc::new(ResolverIndex::build(self.source.as_ref(), &previous, rebuild_names, now));
        match self.index.write() {
            Ok(mut guard) => *guard = Arc::clone(&fresh),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&fresh),
        }
        info!(names_rebuilt = rebuild_names, "dependency index refreshed");
        fresh
    }

    /// The index, refreshed first if its TTL has run out.
    pub fn current(&self) -> Arc<ResolverIndex> {
        let now = self.clock.now();
        let index = self.snapshot();
        if ResolverConfig::is_stale(self.config.dynamic_ttl, index.lists_built_at, now) {
            self.refresh(now)
        } else {
            index
        }
    }

    /// Names of the task lists defining `task_id`, most preferred first.
    /// Any path after the identifier is ignored.
    pub fn task_lists_containing(&self, task_id: &str) -> Vec<String> {
        let Some((id, _)) = split_task_id(task_id) else {
            return Vec::new();
        };
        self.current().lists.lists_containing(id)
    }

    /// Canonical name of the first identifier in `task_ids` that has one.
    pub fn canonical_task_name<S: AsRef<str>>(&self, task_ids: &[S]) -> Option<String> {
        let index = self.current();
        task_ids.iter().find_map(|id| index.names.canonical_name(id.as_ref()).map(str::to_string))
    }

    /// Every hierarchy path defining `task_id`: master projects first,
    /// then team and individual projects.
    pub fn preferred_names(&self, task_id: &str) -> Vec<String> {
        self.current().names.names(task_id)
    }

    /// People waiting on any of `task_ids`, with the earliest date each
    /// needs them, leaving out `ignore`.
    pub fn individuals_waiting_on<S: AsRef<str>>(&self, task_ids: &[S], ignore: &[String]) -> Waiting {
        let mut result = Waiting::new();
        if task_ids.is_empty() {
            return result;
        }
        let index = self.current();
        for id in task_ids {
            let Some(who) = index.lists.waiting_on(id.as_ref()) else {
                continue;
            };
            for (person, date) in who {
                if !ignore.contains(person) {
                    merge_waiting(&mut result, person, *date);
                }
            }
        }
        result
    }

    /// Other people assigned to any of `task_ids`.
    pub fn collaborators<S: AsRef<str>>(&self, task_ids: &[S], ignore: &[String]) -> BTreeSet<String> {
        let index = self.current();
        task_ids
            .iter()
            .filter_map(|id| index.lists.assigned_to(id.as_ref()))
            .flatten()
            .filter(|p| !ignore.contains(p))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManualClock;
    use crate::index::pseudo_task_id;
    use crate::source::{HierarchyEntry, SourceList, StaticSource, TemplateKind};
    use chrono::{TimeZone, Utc};
    use evman_core::{TaskNode, TaskTree};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn t0() -> Time {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn list(name: &str, ids: &[&str], people: &[&str]) -> SourceList {
        let mut tree = TaskTree::new(TaskNode::new(name));
        let root = tree.root();
        for (i, id) in ids.iter().enumerate() {
            let mut n = TaskNode::new(format!("T{i}")).with_task_id(*id);
            if let Some(p) = people.get(i) {
                n = n.with_assignee(*p);
            }
            tree.add_child(root, n).unwrap();
        }
        SourceList::new(name, tree)
    }

    /// Counts how often lists are opened.
    struct Counting {
        inner: StaticSource,
        opens: AtomicUsize,
    }

    impl TaskListSource for Counting {
        fn hierarchy(&self) -> Vec<HierarchyEntry> {
            self.inner.hierarchy()
        }
        fn list_names(&self) -> Vec<String> {
            self.inner.list_names()
        }
        fn open(&self, name: &str) -> Option<SourceList> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open(name)
        }
    }

    fn resolver(lists: Vec<SourceList>) -> (DependencyResolver, Arc<ManualClock>, Arc<Counting>) {
        let source = Arc::new(Counting {
            inner: StaticSource {
                hierarchy: vec![HierarchyEntry {
                    path: "/Project/Design".into(),
                    task_ids: vec!["P:1".into()],
                    template: TemplateKind::Team,
                }],
                lists,
            },
            opens: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(t0()));
        let r = DependencyResolver::with_clock(source.clone(), ResolverConfig::default(), clock.clone());
        (r, clock, source)
    }

    #[test]
    fn test_split_task_id() {
        assert_eq!(split_task_id("P:1"), Some(("P:1", None)));
        assert_eq!(split_task_id("P:1/Code/Review"), Some(("P:1", Some("/Code/Review"))));
        assert_eq!(split_task_id("/abs"), None);
        assert_eq!(split_task_id(""), None);
    }

    #[test]
    fn test_richer_list_preferred() {
        let (r, _, _) = resolver(vec![
            list("Solo", &["P:1"], &["ann"]),
            list("Team", &["P:1", "P:2"], &["ann", "bob"]),
        ]);
        assert_eq!(r.task_lists_containing("P:1/Sub"), ["Team", "Solo"]);
        assert_eq!(r.task_lists_containing("P:2"), ["Team"]);
        assert!(r.task_lists_containing("P:9").is_empty());
        assert_eq!(r.canonical_task_name(&["P:9", "P:1"]).as_deref(), Some("/Project/Design"));
        assert_eq!(r.preferred_names("P:1"), ["/Project/Design"]);
    }

    #[test]
    fn test_index_refreshes_after_ttl() {
        let (r, clock, source) = resolver(vec![list("A", &["P:1"], &[])]);
        r.task_lists_containing("P:1");
        let opened = source.opens.load(Ordering::SeqCst);
        assert_eq!(opened, 1);

        clock.advance(Duration::from_secs(10));
        r.task_lists_containing("P:1");
        assert_eq!(source.opens.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(25));
        r.task_lists_containing("P:1");
        assert_eq!(source.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_readers_keep_their_index_across_swaps() {
        let (r, _, _) = resolver(vec![list("A", &["P:1"], &[])]);
        let before = r.refresh(t0());
        let after = r.refresh(t0());
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.lists.lists_containing("P:1"), ["A"]);
        // Names stay until the static TTL runs out.
        assert_eq!(after.names_built_at, before.names_built_at);
    }

    #[test]
    fn test_pseudo_task_id_resolves_list() {
        let (r, _, _) = resolver(vec![list("A", &[], &[]).with_id("abc")]);
        assert_eq!(pseudo_task_id("abc"), "TL-abc");
        assert_eq!(r.task_lists_containing("TL-abc"), ["A"]);
    }

    #[test]
    fn test_collaborators_and_waiting() {
        let (r, _, _) = resolver(vec![list("A", &["P:1"], &["ann"]), list("B", &["P:1"], &["bob"])]);
        let who = r.collaborators(&["P:1"], &["ann".to_string()]);
        assert_eq!(who.into_iter().collect::<Vec<_>>(), ["bob"]);
        assert!(r.individuals_waiting_on(&["P:1"], &[]).is_empty());
        assert!(r.individuals_waiting_on::<&str>(&[], &[]).is_empty());
    }
}
