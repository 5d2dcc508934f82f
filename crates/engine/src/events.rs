//! Lifecycle events.
//!
//! The engine publishes per-node and per-execution transitions on a
//! broadcast channel so external observers (editor sessions, operators)
//! can follow progress without polling the journal. Delivery is
//! best-effort; the journal remains the system of record.

use cascade_core::{ErrorInfo, ExecutionId, NodeKey};
use cascade_execution::{ExecutionStatus, NodeStatus};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// One lifecycle transition.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// The execution entered RUNNING.
    ExecutionStarted {
        /// The execution.
        execution_id: ExecutionId,
        /// When.
        at: DateTime<Utc>,
    },
    /// A node entered RUNNING.
    NodeStarted {
        /// The execution.
        execution_id: ExecutionId,
        /// The node.
        node_id: NodeKey,
        /// Which attempt.
        attempt: u32,
        /// When.
        at: DateTime<Utc>,
    },
    /// A node reached a terminal status.
    NodeFinished {
        /// The execution.
        execution_id: ExecutionId,
        /// The node.
        node_id: NodeKey,
        /// Which attempt.
        attempt: u32,
        /// Terminal status.
        status: NodeStatus,
        /// Engine-stamped duration.
        duration_ms: u64,
        /// Failure payload, if any.
        error: Option<ErrorInfo>,
    },
    /// A node was pruned without running.
    NodeSkipped {
        /// The execution.
        execution_id: ExecutionId,
        /// The node.
        node_id: NodeKey,
    },
    /// Cancellation was broadcast to the execution.
    CancellationRequested {
        /// The execution.
        execution_id: ExecutionId,
        /// Why.
        reason: String,
    },
    /// The execution reached a terminal status.
    ExecutionFinished {
        /// The execution.
        execution_id: ExecutionId,
        /// Terminal status.
        status: ExecutionStatus,
        /// When.
        at: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// The execution this event belongs to.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeFinished { execution_id, .. }
            | Self::NodeSkipped { execution_id, .. }
            | Self::CancellationRequested { execution_id, .. }
            | Self::ExecutionFinished { execution_id, .. } => *execution_id,
        }
    }
}

/// Broadcast bus for [`ExecutionEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all subsequent events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Lagging or absent subscribers are not an error.
    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = ExecutionId::v4();
        bus.emit(ExecutionEvent::ExecutionStarted {
            execution_id: id,
            at: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.execution_id(), id);
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emit(ExecutionEvent::NodeSkipped {
            execution_id: ExecutionId::v4(),
            node_id: NodeKey::new("n").unwrap(),
        });
    }
}
