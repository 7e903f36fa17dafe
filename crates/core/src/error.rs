//! Errors for structural tree edits.

use crate::NodeId;

/// Result alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors raised when a structural edit would break the tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The node is not (or no longer) in the tree.
    #[error("Node not found: {0}")]
    NotFound(NodeId),

    /// Moving the node would make it its own ancestor.
    #[error("Moving {node} under {parent} would create a cycle")]
    Cycle {
        /// The node being moved.
        node: NodeId,
        /// The requested new parent.
        parent: NodeId,
    },

    /// The root cannot be moved or removed.
    #[error("The root node cannot be moved or removed")]
    Root,

    /// Child position past the end of the child list.
    #[error("Position {pos} out of range for {parent}")]
    Position {
        /// The parent node.
        parent: NodeId,
        /// The requested position.
        pos: usize,
    },
}
