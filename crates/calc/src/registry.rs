//! Named task-list definitions.
//!
//! A registry holds the saved form of every task list and the baseline
//! snapshots they refer to. Opening a list builds it, with rollups opening
//! their children recursively. A rollup that reaches itself through its
//! children gets an error placeholder in place of the repeated list.

use crate::calculator::{CiProviders, TaskList};
use crate::config::CalculatorConfig;
use crate::errors::MilestoneProvider;
use crate::guard::CircularGuard;
use evman_core::{Snapshot, TaskTree, Time};
use evman_schedule::{Schedule, ScheduleData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Saved form of a task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListDefinition {
    /// A task list with its own tree and schedule.
    Plain {
        /// Task tree.
        tree: TaskTree,
        /// Schedule periods.
        schedule: ScheduleData,
        /// Calculator settings.
        #[serde(default)]
        config: CalculatorConfig,
        /// Name of the baseline snapshot.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        baseline: Option<String>,
    },
    /// A rollup of other task lists, by name.
    Rollup {
        /// Child list names, in order.
        children: Vec<String>,
        /// Calculator settings.
        #[serde(default = "CalculatorConfig::rollup")]
        config: CalculatorConfig,
        /// Name of the baseline snapshot.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        baseline: Option<String>,
    },
}

/// Task-list definitions, baseline snapshots and the shared sources every
/// opened list is wired to.
#[derive(Default)]
pub struct Registry {
    definitions: BTreeMap<String, ListDefinition>,
    snapshots: BTreeMap<String, Arc<Snapshot>>,
    ci: CiProviders,
    milestones: Option<Arc<dyn MilestoneProvider>>,
    circular: CircularGuard,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .field("snapshots", &self.snapshots.keys().collect::<Vec<_>>())
            .field("ci", &self.ci)
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition.
    pub fn define(&mut self, name: impl Into<String>, definition: ListDefinition) {
        self.definitions.insert(name.into(), definition);
    }

    /// Add or replace a snapshot, keyed by its name.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshots.insert(snapshot.name.clone(), Arc::new(snapshot));
    }

    /// Snapshot by name.
    pub fn snapshot(&self, name: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.get(name).cloned()
    }

    /// Definition by name.
    pub fn definition(&self, name: &str) -> Option<&ListDefinition> {
        self.definitions.get(name)
    }

    /// Defined list names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Interval sources for plain lists opened from now on.
    pub fn set_ci_providers(&mut self, providers: CiProviders) {
        self.ci = providers;
    }

    /// Milestone source for plain lists opened from now on.
    pub fn set_milestones(&mut self, provider: Option<Arc<dyn MilestoneProvider>>) {
        self.milestones = provider;
    }

    /// Build the task list `name`. Lists that cannot be built come back as
    /// placeholders carrying the reason, so a rollup still opens around
    /// them.
    pub fn open(&self, name: &str, now: Time) -> TaskList {
        let Some(_scope) = self.circular.enter(name) else {
            return TaskList::placeholder(name, format!("Circular reference to task list \"{name}\""), now);
        };
        let Some(definition) = self.definitions.get(name) else {
            warn!(task_list = name, "task list not found");
            return TaskList::placeholder(name, format!("The task list \"{name}\" could not be found"), now);
        };

        let mut list = match definition {
            ListDefinition::Plain { tree, schedule, config, .. } => {
                if let Err(e) = config.validate() {
                    return TaskList::placeholder(name, e.to_string(), now);
                }
                let Some(schedule) = Schedule::from_data(schedule.clone()) else {
                    return TaskList::placeholder(name, format!("The schedule for \"{name}\" is invalid"), now);
                };
                let mut list = TaskList::new(name, tree.clone(), schedule, config.clone());
                list.set_ci_providers(self.ci.clone());
                list.set_milestones(self.milestones.clone());
                list
            }
            ListDefinition::Rollup { children, config, .. } => {
                if let Err(e) = config.validate() {
                    return TaskList::placeholder(name, e.to_string(), now);
                }
                let children = children.iter().map(|c| self.open(c, now)).collect();
                TaskList::rollup(name, children, config.clone(), now)
            }
        };

        let baseline = match definition {
            ListDefinition::Plain { baseline, .. } | ListDefinition::Rollup { baseline, .. } => baseline,
        };
        if let Some(b) = baseline {
            let snapshot = self.snapshot(b);
            if snapshot.is_none() {
                warn!(task_list = name, baseline = %b, "baseline snapshot not found");
            }
            list.set_baseline(snapshot);
        }
        debug!(task_list = name, rollup = list.is_rollup(), "task list opened");
        list
    }
}
