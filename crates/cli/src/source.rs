//! Task lists from the store, as seen by the dependency resolver.

use evman_calc::{Registry, TaskList};
use evman_core::Time;
use evman_deps::{HierarchyEntry, SourceList, TaskListSource};
use std::sync::{Mutex, MutexGuard};

/// Opens and recalculates stored task lists on behalf of the resolver.
pub struct RegistrySource {
    registry: Mutex<Registry>,
    hierarchy: Vec<HierarchyEntry>,
    now: Time,
}

impl RegistrySource {
    pub fn new(registry: Registry, hierarchy: Vec<HierarchyEntry>, now: Time) -> Self {
        Self { registry: Mutex::new(registry), hierarchy, now }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.lock().definition(name).is_some()
    }

    /// Open `name` without recalculating it.
    pub fn open_list(&self, name: &str) -> TaskList {
        self.lock().open(name, self.now)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TaskListSource for RegistrySource {
    fn hierarchy(&self) -> Vec<HierarchyEntry> {
        self.hierarchy.clone()
    }

    fn list_names(&self) -> Vec<String> {
        self.lock().names().map(str::to_string).collect()
    }

    fn open(&self, name: &str) -> Option<SourceList> {
        if !self.is_defined(name) {
            return None;
        }
        let mut list = self.open_list(name);
        list.recalc_at(self.now);
        Some(to_source(&list))
    }
}

fn to_source(list: &TaskList) -> SourceList {
    list.children()
        .iter()
        .fold(SourceList::new(list.name(), list.tree().clone()), |source, child| source.with_sub_list(to_source(child)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use evman_calc::{CalculatorConfig, ListDefinition};
    use evman_core::{TaskNode, TaskTree};
    use evman_schedule::Schedule;

    fn t(day: u32) -> Time {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn registry() -> Registry {
        let mut r = Registry::new();
        for (name, id) in [("Ann", "P:1"), ("Bob", "P:2")] {
            let mut tree = TaskTree::new(TaskNode::new(name));
            let root = tree.root();
            tree.add_child(root, TaskNode::new("Code").with_task_id(id).with_plan(60.0)).unwrap();
            r.define(
                name,
                ListDefinition::Plain {
                    tree,
                    schedule: Schedule::weekly(t(1), 20.0).to_data(),
                    config: CalculatorConfig::default(),
                    baseline: None,
                },
            );
        }
        r.define(
            "Team",
            ListDefinition::Rollup { children: vec!["Ann".into(), "Bob".into()], config: CalculatorConfig::rollup(), baseline: None },
        );
        r
    }

    #[test]
    fn test_opens_recalculated_lists() {
        let source = RegistrySource::new(registry(), Vec::new(), t(3));
        assert_eq!(source.list_names(), ["Ann", "Bob", "Team"]);
        let ann = source.open("Ann").unwrap();
        let code = ann.tree.find_by_path("/Code").unwrap();
        assert_eq!(ann.tree[code].ev.plan_time, 60.0);
        assert!(source.open("Nobody").is_none());
    }

    #[test]
    fn test_rollup_carries_sub_lists() {
        let source = RegistrySource::new(registry(), Vec::new(), t(3));
        let team = source.open("Team").unwrap();
        let names: Vec<&str> = team.sub_lists.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Ann", "Bob"]);
        assert!(team.tree.find_by_path("/Bob/Code").is_some());
    }
}
