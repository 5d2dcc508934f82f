//! The journal trait — the system of record for executions.

use async_trait::async_trait;
use cascade_core::{ErrorInfo, ExecutionId, NodeKey, PrincipalId};
use cascade_value::Value;

use crate::error::JournalError;
use crate::record::{ExecutionRecord, NodeExecutionRecord};
use crate::status::{ExecutionStatus, NodeStatus};

/// A validated node status change, applied atomically to one row.
#[derive(Debug, Clone)]
pub enum NodeTransition {
    /// WAITING → READY, freezing the fan-in merge.
    Ready {
        /// The merged input, frozen at this moment.
        input_snapshot: Value,
    },
    /// READY → RUNNING.
    Running,
    /// RUNNING → SUCCEEDED.
    Succeeded {
        /// The handler's output.
        output: Value,
        /// Engine-stamped duration.
        duration_ms: u64,
    },
    /// RUNNING → FAILED (handler error or timeout).
    Failed {
        /// The failure payload.
        error: ErrorInfo,
        /// Engine-stamped duration.
        duration_ms: u64,
    },
    /// WAITING/READY → SKIPPED (failure policy pruned the subtree).
    Skipped,
    /// Any non-terminal → CANCELLED.
    Cancelled {
        /// The failure payload, `kind = CANCELLED`.
        error: ErrorInfo,
    },
}

impl NodeTransition {
    /// The status this transition lands on.
    #[must_use]
    pub fn target_status(&self) -> NodeStatus {
        match self {
            Self::Ready { .. } => NodeStatus::Ready,
            Self::Running => NodeStatus::Running,
            Self::Succeeded { .. } => NodeStatus::Succeeded,
            Self::Failed { .. } => NodeStatus::Failed,
            Self::Skipped => NodeStatus::Skipped,
            Self::Cancelled { .. } => NodeStatus::Cancelled,
        }
    }
}

/// Pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to return.
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// The durable store of [`ExecutionRecord`]s and [`NodeExecutionRecord`]s.
///
/// Contracts the scheduler relies on:
///
/// - **Atomic transitions.** A row's status advances linearly through the
///   transition tables; anything else returns
///   [`JournalError::InvalidTransition`].
/// - **Append-only attempts.** Retries create new rows with incremented
///   `attempt`; terminal rows are never rewritten.
/// - **Durability on the hot path.** RUNNING→terminal changes are durably
///   applied before the call returns; implementations may batch everything
///   else.
/// - **Concurrent writers.** Per-row updates are linearizable.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Insert a new PENDING execution row.
    async fn create_execution(&self, record: ExecutionRecord) -> Result<(), JournalError>;

    /// Advance an execution's status, stamping `started_at` / `ended_at`.
    async fn transition_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<(), JournalError>;

    /// Set the output document (on COMPLETED).
    async fn set_execution_output(
        &self,
        id: ExecutionId,
        output: Value,
    ) -> Result<(), JournalError>;

    /// Set the top-level error if none is recorded yet; later calls are
    /// no-ops so the first failure wins.
    async fn set_execution_error(
        &self,
        id: ExecutionId,
        error: ErrorInfo,
    ) -> Result<(), JournalError>;

    /// Insert a WAITING node row (a new attempt).
    async fn create_node_execution(
        &self,
        record: NodeExecutionRecord,
    ) -> Result<(), JournalError>;

    /// Apply one validated status change to a node row.
    async fn transition_node(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeKey,
        attempt: u32,
        transition: NodeTransition,
    ) -> Result<(), JournalError>;

    /// Fetch one execution.
    async fn execution(&self, id: ExecutionId) -> Result<ExecutionRecord, JournalError>;

    /// A principal's executions, `started_at` descending.
    async fn executions_for(
        &self,
        principal: PrincipalId,
        page: Page,
    ) -> Result<Vec<ExecutionRecord>, JournalError>;

    /// Every node row of one execution, ordered by `started_at` (rows that
    /// never started sort last, by node id).
    async fn node_executions(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<NodeExecutionRecord>, JournalError>;

    /// The execution's terminal output document, if any.
    async fn execution_output(&self, id: ExecutionId) -> Result<Option<Value>, JournalError>;
}
