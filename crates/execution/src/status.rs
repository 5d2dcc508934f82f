//! Execution-level and node-level status enums.

use serde::{Deserialize, Serialize};

/// The overall status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Accepted, not yet scheduled.
    Pending,
    /// Nodes are being scheduled and executed.
    Running,
    /// Every reachable node succeeded.
    Completed,
    /// At least one node failed (including by timeout).
    Failed,
    /// Halted by an external cancellation request.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns `true` once the execution can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// The status of one node within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// Discovered by the scheduler; predecessors still outstanding.
    Waiting,
    /// In-degree satisfied; input snapshot frozen; eligible to run.
    Ready,
    /// Handler invoked.
    Running,
    /// Handler returned success.
    Succeeded,
    /// Handler returned an error, or the node timed out.
    Failed,
    /// Pruned by the failure policy; never ran.
    Skipped,
    /// Halted by cancellation.
    Cancelled,
}

impl NodeStatus {
    /// Returns `true` once the node can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Returns `true` if a successor may still become ready through this
    /// node.
    #[must_use]
    pub fn unblocks_successors(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "WAITING",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_terminal_states() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn node_terminal_states() {
        for s in [
            NodeStatus::Succeeded,
            NodeStatus::Failed,
            NodeStatus::Skipped,
            NodeStatus::Cancelled,
        ] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
        for s in [NodeStatus::Waiting, NodeStatus::Ready, NodeStatus::Running] {
            assert!(!s.is_terminal(), "{s} should not be terminal");
        }
    }

    #[test]
    fn only_success_unblocks_successors() {
        assert!(NodeStatus::Succeeded.unblocks_successors());
        assert!(!NodeStatus::Failed.unblocks_successors());
        assert!(!NodeStatus::Skipped.unblocks_successors());
        assert!(!NodeStatus::Cancelled.unblocks_successors());
    }

    #[test]
    fn wire_names_are_stable() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Running).unwrap(),
            "\"RUNNING\""
        );
        assert_eq!(
            serde_json::to_string(&NodeStatus::Skipped).unwrap(),
            "\"SKIPPED\""
        );
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(ExecutionStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(NodeStatus::Waiting.to_string(), "WAITING");
    }
}
