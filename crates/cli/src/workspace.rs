//! Workspace files: a whole set of task lists in one JSON document.

use anyhow::{Context, Result};
use evman_calc::ListDefinition;
use evman_core::Snapshot;
use evman_deps::HierarchyEntry;
use evman_storage::ScheduleStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Everything a store holds, in one file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub lists: BTreeMap<String, ListDefinition>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub hierarchy: Vec<HierarchyEntry>,
}

impl Workspace {
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading workspace {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing workspace {}", path.display()))
    }

    /// Write every part into `store`. The hierarchy is only replaced when
    /// the workspace has one.
    pub async fn save_into<S: ScheduleStore>(&self, store: &mut S) -> Result<usize> {
        for (name, definition) in &self.lists {
            store.save_definition(name, definition).await.with_context(|| format!("saving task list {name}"))?;
        }
        for snapshot in &self.snapshots {
            store.save_snapshot(snapshot).await.with_context(|| format!("saving snapshot {}", snapshot.name))?;
        }
        if !self.hierarchy.is_empty() {
            store.save_hierarchy(&self.hierarchy).await.context("saving hierarchy")?;
        }
        Ok(self.lists.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use evman_calc::CalculatorConfig;
    use evman_core::{TaskNode, TaskTree};
    use evman_deps::TemplateKind;
    use evman_schedule::Schedule;
    use evman_storage::JsonStore;

    fn workspace() -> Workspace {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tree = TaskTree::new(TaskNode::new("Ann"));
        let root = tree.root();
        tree.add_child(root, TaskNode::new("Code").with_task_id("P:1").with_plan(60.0)).unwrap();
        let mut lists = BTreeMap::new();
        lists.insert(
            "Ann".to_string(),
            ListDefinition::Plain {
                tree,
                schedule: Schedule::weekly(start, 20.0).to_data(),
                config: CalculatorConfig::default(),
                baseline: None,
            },
        );
        lists.insert(
            "Team".to_string(),
            ListDefinition::Rollup { children: vec!["Ann".into()], config: CalculatorConfig::rollup(), baseline: None },
        );
        Workspace {
            lists,
            snapshots: Vec::new(),
            hierarchy: vec![HierarchyEntry {
                path: "/Project".into(),
                task_ids: vec!["P:1".into()],
                template: TemplateKind::Master,
            }],
        }
    }

    #[tokio::test]
    async fn test_workspace_imports_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.json");
        tokio::fs::write(&path, serde_json::to_string(&workspace()).unwrap()).await.unwrap();

        let loaded = Workspace::load(&path).await.unwrap();
        let mut store = JsonStore::new(dir.path().join("store")).await.unwrap();
        assert_eq!(loaded.save_into(&mut store).await.unwrap(), 2);
        assert_eq!(store.list_definitions().await.unwrap(), ["Ann", "Team"]);
        assert_eq!(store.load_hierarchy().await.unwrap()[0].path, "/Project");
    }

    #[tokio::test]
    async fn test_empty_hierarchy_keeps_stored_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path()).await.unwrap();
        workspace().save_into(&mut store).await.unwrap();
        Workspace::default().save_into(&mut store).await.unwrap();
        assert_eq!(store.load_hierarchy().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let err = Workspace::load(Path::new("/nonexistent/workspace.json")).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/workspace.json"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let bad = r#"{ "lists": { "Team": { "kind": "sideways", "children": [] } } }"#;
        assert!(serde_json::from_str::<Workspace>(bad).is_err());
        let good = r#"{ "lists": { "Team": { "kind": "rollup", "children": [] } } }"#;
        assert_eq!(serde_json::from_str::<Workspace>(good).unwrap().lists.len(), 1);
    }
}
