//! Journal rows.

use cascade_core::{ErrorInfo, ExecutionId, FlowId, NodeKey, PrincipalId};
use cascade_value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{ExecutionStatus, NodeStatus};

/// One execution of a flow version: the top-level journal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique execution id.
    pub id: ExecutionId,
    /// The flow that was executed.
    pub flow_id: FlowId,
    /// The flow document version.
    pub flow_version: semver::Version,
    /// Owning user.
    pub principal: PrincipalId,
    /// Current status.
    pub status: ExecutionStatus,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When scheduling began.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution reached a terminal status.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// The initial input document.
    pub input: Value,
    /// The output document, set on COMPLETED.
    #[serde(default)]
    pub output: Option<Value>,
    /// The single top-level cause, set from the first failed node.
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl ExecutionRecord {
    /// Create a PENDING record.
    #[must_use]
    pub fn new(
        id: ExecutionId,
        flow_id: FlowId,
        flow_version: semver::Version,
        principal: PrincipalId,
        input: Value,
    ) -> Self {
        Self {
            id,
            flow_id,
            flow_version,
            principal,
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            input,
            output: None,
            error: None,
        }
    }

    /// Wall-clock duration, once started and ended.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => u64::try_from((end - start).num_milliseconds()).ok(),
            _ => None,
        }
    }
}

/// One node's participation in one execution attempt: the per-node row.
///
/// Retries append new rows with incremented `attempt`; rows are never
/// rewritten once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    /// Owning execution.
    pub execution_id: ExecutionId,
    /// The node.
    pub node_id: NodeKey,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// Current status.
    pub status: NodeStatus,
    /// When the row was created (node discovered).
    pub created_at: DateTime<Utc>,
    /// The fan-in merge frozen at the READY transition.
    #[serde(default)]
    pub input_snapshot: Option<Value>,
    /// The handler's output, set on SUCCEEDED.
    #[serde(default)]
    pub output_snapshot: Option<Value>,
    /// Failure payload, set on FAILED or CANCELLED.
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    /// Handler execution time, stamped by the engine.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// When the handler was invoked.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal status.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl NodeExecutionRecord {
    /// Create a WAITING row for the first attempt.
    #[must_use]
    pub fn new(execution_id: ExecutionId, node_id: NodeKey) -> Self {
        Self::attempt(execution_id, node_id, 1)
    }

    /// Create a WAITING row for a specific attempt number.
    #[must_use]
    pub fn attempt(execution_id: ExecutionId, node_id: NodeKey, attempt: u32) -> Self {
        Self {
            execution_id,
            node_id,
            attempt,
            status: NodeStatus::Waiting,
            created_at: Utc::now(),
            input_snapshot: None,
            output_snapshot: None,
            error: None,
            duration_ms: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Returns `true` once the row can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::ErrorKind;
    use pretty_assertions::assert_eq;

    fn record() -> ExecutionRecord {
        ExecutionRecord::new(
            ExecutionId::v4(),
            FlowId::v4(),
            semver::Version::new(1, 0, 0),
            PrincipalId::v4(),
            Value::from_json(serde_json::json!({"seed": 1})),
        )
    }

    #[test]
    fn new_execution_is_pending() {
        let rec = record();
        assert_eq!(rec.status, ExecutionStatus::Pending);
        assert!(rec.started_at.is_none());
        assert!(rec.ended_at.is_none());
        assert!(rec.output.is_none());
        assert!(rec.error.is_none());
        assert_eq!(rec.duration_ms(), None);
    }

    #[test]
    fn duration_requires_both_timestamps() {
        let mut rec = record();
        let t0 = Utc::now();
        rec.started_at = Some(t0);
        assert_eq!(rec.duration_ms(), None);
        rec.ended_at = Some(t0 + chrono::Duration::milliseconds(250));
        assert_eq!(rec.duration_ms(), Some(250));
    }

    #[test]
    fn node_record_first_attempt() {
        let row = NodeExecutionRecord::new(ExecutionId::v4(), NodeKey::new("gen").unwrap());
        assert_eq!(row.attempt, 1);
        assert_eq!(row.status, NodeStatus::Waiting);
        assert!(!row.is_terminal());
        assert!(row.input_snapshot.is_none());
    }

    #[test]
    fn execution_serde_roundtrip() {
        let mut rec = record();
        rec.error = Some(ErrorInfo::new(ErrorKind::Upstream, "503"));
        let json = serde_json::to_string(&rec).unwrap();
        let back: ExecutionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }

    #[test]
    fn node_serde_roundtrip() {
        let mut row =
            NodeExecutionRecord::attempt(ExecutionId::v4(), NodeKey::new("agg").unwrap(), 3);
        row.status = NodeStatus::Succeeded;
        row.output_snapshot = Some(Value::from_json(serde_json::json!({"sum": 6})));
        row.duration_ms = Some(12);
        let json = serde_json::to_string(&row).unwrap();
        let back: NodeExecutionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }
}
