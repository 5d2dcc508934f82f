//! State machine transition tables.
//!
//! Both status enums advance linearly; the journal rejects anything not in
//! these tables, which is what makes out-of-order updates impossible.

use crate::error::JournalError;
use crate::status::{ExecutionStatus, NodeStatus};

/// Returns `true` if the execution-level transition is allowed.
#[must_use]
pub fn can_transition_execution(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    matches!(
        (from, to),
        (ExecutionStatus::Pending, ExecutionStatus::Running)
            | (ExecutionStatus::Pending, ExecutionStatus::Failed)
            | (ExecutionStatus::Pending, ExecutionStatus::Cancelled)
            | (ExecutionStatus::Running, ExecutionStatus::Completed)
            | (ExecutionStatus::Running, ExecutionStatus::Failed)
            | (ExecutionStatus::Running, ExecutionStatus::Cancelled)
    )
}

/// Validate an execution-level transition.
pub fn validate_execution_transition(
    from: ExecutionStatus,
    to: ExecutionStatus,
) -> Result<(), JournalError> {
    if can_transition_execution(from, to) {
        Ok(())
    } else {
        Err(JournalError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Returns `true` if the node-level transition is allowed.
#[must_use]
pub fn can_transition_node(from: NodeStatus, to: NodeStatus) -> bool {
    matches!(
        (from, to),
        (NodeStatus::Waiting, NodeStatus::Ready)
            | (NodeStatus::Waiting, NodeStatus::Skipped)
            | (NodeStatus::Waiting, NodeStatus::Cancelled)
            | (NodeStatus::Ready, NodeStatus::Running)
            | (NodeStatus::Ready, NodeStatus::Skipped)
            | (NodeStatus::Ready, NodeStatus::Cancelled)
            | (NodeStatus::Running, NodeStatus::Succeeded)
            | (NodeStatus::Running, NodeStatus::Failed)
            | (NodeStatus::Running, NodeStatus::Cancelled)
    )
}

/// Validate a node-level transition.
pub fn validate_node_transition(from: NodeStatus, to: NodeStatus) -> Result<(), JournalError> {
    if can_transition_node(from, to) {
        Ok(())
    } else {
        Err(JournalError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ExecutionStatus::Pending, ExecutionStatus::Running)]
    #[case(ExecutionStatus::Pending, ExecutionStatus::Cancelled)]
    #[case(ExecutionStatus::Running, ExecutionStatus::Completed)]
    #[case(ExecutionStatus::Running, ExecutionStatus::Failed)]
    #[case(ExecutionStatus::Running, ExecutionStatus::Cancelled)]
    fn valid_execution_transitions(#[case] from: ExecutionStatus, #[case] to: ExecutionStatus) {
        assert!(can_transition_execution(from, to));
        assert!(validate_execution_transition(from, to).is_ok());
    }

    #[rstest]
    #[case(ExecutionStatus::Pending, ExecutionStatus::Completed)]
    #[case(ExecutionStatus::Completed, ExecutionStatus::Running)]
    #[case(ExecutionStatus::Failed, ExecutionStatus::Completed)]
    #[case(ExecutionStatus::Cancelled, ExecutionStatus::Running)]
    #[case(ExecutionStatus::Running, ExecutionStatus::Pending)]
    fn invalid_execution_transitions(#[case] from: ExecutionStatus, #[case] to: ExecutionStatus) {
        assert!(!can_transition_execution(from, to));
        assert!(validate_execution_transition(from, to).is_err());
    }

    #[rstest]
    #[case(NodeStatus::Waiting, NodeStatus::Ready)]
    #[case(NodeStatus::Waiting, NodeStatus::Skipped)]
    #[case(NodeStatus::Ready, NodeStatus::Running)]
    #[case(NodeStatus::Ready, NodeStatus::Cancelled)]
    #[case(NodeStatus::Running, NodeStatus::Succeeded)]
    #[case(NodeStatus::Running, NodeStatus::Failed)]
    #[case(NodeStatus::Running, NodeStatus::Cancelled)]
    fn valid_node_transitions(#[case] from: NodeStatus, #[case] to: NodeStatus) {
        assert!(can_transition_node(from, to));
    }

    #[rstest]
    #[case(NodeStatus::Waiting, NodeStatus::Running)]
    #[case(NodeStatus::Waiting, NodeStatus::Succeeded)]
    #[case(NodeStatus::Ready, NodeStatus::Succeeded)]
    #[case(NodeStatus::Running, NodeStatus::Ready)]
    #[case(NodeStatus::Running, NodeStatus::Skipped)]
    #[case(NodeStatus::Succeeded, NodeStatus::Running)]
    #[case(NodeStatus::Failed, NodeStatus::Succeeded)]
    #[case(NodeStatus::Skipped, NodeStatus::Ready)]
    fn invalid_node_transitions(#[case] from: NodeStatus, #[case] to: NodeStatus) {
        assert!(!can_transition_node(from, to));
        assert!(validate_node_transition(from, to).is_err());
    }

    #[test]
    fn no_transition_out_of_terminal_states() {
        let all = [
            NodeStatus::Waiting,
            NodeStatus::Ready,
            NodeStatus::Running,
            NodeStatus::Succeeded,
            NodeStatus::Failed,
            NodeStatus::Skipped,
            NodeStatus::Cancelled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in &all {
                assert!(
                    !can_transition_node(*from, *to),
                    "terminal {from} must not transition to {to}"
                );
            }
        }
    }
}
