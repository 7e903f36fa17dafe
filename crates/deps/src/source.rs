//! Where the resolver reads task lists and the project hierarchy from.

use evman_core::TaskTree;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Process template a hierarchy node was created from. Names defined by
/// master projects are preferred over team projects, and team projects
/// over individual ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// A master project spanning several teams.
    Master,
    /// A team project.
    Team,
    /// An individual's project.
    Individual,
    /// Anything else.
    #[default]
    Other,
}

impl TemplateKind {
    /// Base preference of names defined under this template.
    pub fn preference(self) -> i64 {
        100 + match self {
            TemplateKind::Master => 3000,
            TemplateKind::Team => 2000,
            TemplateKind::Individual => 1000,
            TemplateKind::Other => 0,
        }
    }
}

/// A node of the project hierarchy that defines task identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyEntry {
    /// Full path of the node.
    pub path: String,
    /// Identifiers defined at this node, most preferred first.
    pub task_ids: Vec<String>,
    /// Template the node was created from.
    #[serde(default)]
    pub template: TemplateKind,
}

/// A recalculated task list.
#[derive(Debug, Clone)]
pub struct SourceList {
    /// List name.
    pub name: String,
    /// Stable list identifier, used for the list's pseudo task id.
    pub id: Option<String>,
    /// The recalculated tree.
    pub tree: Arc<TaskTree>,
    /// Child lists of a rollup.
    pub sub_lists: Vec<SourceList>,
}

impl SourceList {
    /// A plain list.
    pub fn new(name: impl Into<String>, tree: TaskTree) -> Self {
        Self { name: name.into(), id: None, tree: Arc::new(tree), sub_lists: Vec::new() }
    }

    /// Builder: set the list identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: add a child list.
    pub fn with_sub_list(mut self, list: SourceList) -> Self {
        self.sub_lists.push(list);
        self
    }
}

/// Supplies the data the resolver indexes.
pub trait TaskListSource: Send + Sync {
    /// Hierarchy nodes carrying task identifiers.
    fn hierarchy(&self) -> Vec<HierarchyEntry>;

    /// Names of every known task list.
    fn list_names(&self) -> Vec<String>;

    /// Open and recalculate the list `name`.
    fn open(&self, name: &str) -> Option<SourceList>;
}

/// A source holding fixed data.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    /// Hierarchy entries.
    pub hierarchy: Vec<HierarchyEntry>,
    /// Task lists.
    pub lists: Vec<SourceList>,
}

impl TaskListSource for StaticSource {
    fn hierarchy(&self) -> Vec<HierarchyEntry> {
        self.hierarchy.clone()
    }

    fn list_names(&self) -> Vec<String> {
        self.lists.iter().map(|l| l.name.clone()).collect()
    }

    fn open(&self, name: &str) -> Option<SourceList> {
        self.lists.iter().find(|l| l.name == name).cloned()
    }
}
