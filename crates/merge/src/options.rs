//! Merge options.

use evman_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a task list is merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Keep each contributor's leaf below the merged node it belongs to.
    #[serde(default)]
    pub preserve_leaves: bool,

    /// Collapse chains of single-child nodes into one node.
    #[serde(default)]
    pub simplify: bool,

    /// Carry node types onto merged nodes.
    #[serde(default = "default_true")]
    pub use_node_types: bool,

    /// Source nodes to admit. Their ancestors are admitted as containers.
    #[serde(default)]
    pub filter: Option<BTreeSet<NodeId>>,
}

fn default_true() -> bool {
    true
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { preserve_leaves: false, simplify: false, use_node_types: true, filter: None }
    }
}

impl MergeOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set preserve-leaves mode.
    pub fn with_preserve_leaves(mut self, on: bool) -> Self {
        self.preserve_leaves = on;
        self
    }

    /// Set chain simplification.
    pub fn with_simplify(mut self, on: bool) -> Self {
        self.simplify = on;
        self
    }

    /// Set whether node types are carried.
    pub fn with_node_types(mut self, on: bool) -> Self {
        self.use_node_types = on;
        self
    }

    /// Admit only `nodes` and their ancestors.
    pub fn with_filter(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.filter = Some(nodes.into_iter().collect());
        self
    }

    /// The options a baseline is merged with: no filter, no simplification.
    pub(crate) fn for_baseline(&self) -> Self {
        Self { preserve_leaves: self.preserve_leaves, simplify: false, use_node_types: self.use_node_types, filter: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let options: MergeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, MergeOptions::default());
        assert!(options.use_node_types);
        assert!(!options.preserve_leaves);
    }

    #[test]
    fn test_baseline_options_drop_filter_and_simplify() {
        let options = MergeOptions::new().with_simplify(true).with_preserve_leaves(true).with_filter([]);
        let baseline = options.for_baseline();
        assert!(baseline.filter.is_none());
        assert!(!baseline.simplify);
        assert!(baseline.preserve_leaves);
    }
}
