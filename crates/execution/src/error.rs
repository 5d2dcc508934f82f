//! Journal errors.

use cascade_core::{ExecutionId, NodeKey};

/// Errors from journal operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    /// No execution with that id.
    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),

    /// No node execution row for that `(execution, node, attempt)`.
    #[error("node execution {node} (attempt {attempt}) not found in execution {execution}")]
    NodeNotFound {
        /// The execution.
        execution: ExecutionId,
        /// The node.
        node: NodeKey,
        /// The attempt number.
        attempt: u32,
    },

    /// A row already exists where a create was attempted.
    #[error("duplicate row: {0}")]
    Duplicate(String),

    /// The requested status change is not in the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// The backing store failed.
    #[error("journal storage error: {0}")]
    Storage(String),
}
