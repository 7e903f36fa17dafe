//! Store trait abstraction.

use async_trait::async_trait;
use evman_calc::{ListDefinition, Registry};
use evman_core::Snapshot;
use evman_deps::HierarchyEntry;

/// Error type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Name that cannot be stored
    #[error("Invalid name: {0:?}")]
    InvalidName(String),
}

/// Persistent home of task-list definitions, baseline snapshots and the
/// project hierarchy.
///
/// The engine never writes through this trait on its own; callers load what
/// they need before recalculating and save snapshots they take.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    // === Task-list definitions ===

    /// Save a definition (create or replace).
    async fn save_definition(&mut self, name: &str, definition: &ListDefinition) -> Result<()>;

    /// Load a definition by list name.
    async fn load_definition(&self, name: &str) -> Result<Option<ListDefinition>>;

    /// Names of all stored definitions, sorted.
    async fn list_definitions(&self) -> Result<Vec<String>>;

    /// Delete a definition. Deleting a missing one is not an error.
    async fn delete_definition(&mut self, name: &str) -> Result<()>;

    // === Baseline snapshots ===

    /// Save a snapshot under its name, replacing any with the same name.
    async fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Load a snapshot by name.
    async fn load_snapshot(&self, name: &str) -> Result<Option<Snapshot>>;

    /// All stored snapshots, oldest first.
    async fn list_snapshots(&self) -> Result<Vec<Snapshot>>;

    // === Hierarchy ===

    /// Replace the project hierarchy.
    async fn save_hierarchy(&mut self, entries: &[HierarchyEntry]) -> Result<()>;

    /// The project hierarchy, empty when none was saved.
    async fn load_hierarchy(&self) -> Result<Vec<HierarchyEntry>>;

    // === Versions ===

    /// Number of times the definition `name` was saved.
    async fn definition_version(&self, name: &str) -> Result<u64>;

    /// A registry holding every stored definition and snapshot.
    async fn load_registry(&self) -> Result<Registry> {
        let mut registry = Registry::new();
        for name in self.list_definitions().await? {
            if let Some(definition) = self.load_definition(&name).await? {
                registry.define(name, definition);
            }
        }
        for snapshot in self.list_snapshots().await? {
            registry.add_snapshot(snapshot);
        }
        Ok(registry)
    }
}
