//! Merge errors.

use evman_core::TreeError;

/// Result alias for merges.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors raised while building a merged tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// A structural edit of the merged tree failed.
    #[error("Merged tree edit failed: {0}")]
    Tree(#[from] TreeError),
}
