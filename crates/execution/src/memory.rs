//! In-memory journal.
//!
//! One mutex per execution: every row of an execution lives behind the same
//! lock, which gives linearizable per-row updates while keeping unrelated
//! executions contention-free.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::{ErrorInfo, ExecutionId, NodeKey, PrincipalId};
use cascade_value::Value;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::JournalError;
use crate::journal::{Journal, NodeTransition, Page};
use crate::record::{ExecutionRecord, NodeExecutionRecord};
use crate::status::ExecutionStatus;
#[cfg(test)]
use crate::status::NodeStatus;
use crate::transition::{validate_execution_transition, validate_node_transition};

#[derive(Debug)]
struct ExecutionEntry {
    record: ExecutionRecord,
    /// Keyed by `(node, attempt)`; BTreeMap keeps query order stable.
    nodes: BTreeMap<(NodeKey, u32), NodeExecutionRecord>,
}

/// The in-process [`Journal`] implementation.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    executions: DashMap<ExecutionId, Arc<Mutex<ExecutionEntry>>>,
}

impl MemoryJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: ExecutionId) -> Result<Arc<Mutex<ExecutionEntry>>, JournalError> {
        self.executions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(JournalError::ExecutionNotFound(id))
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn create_execution(&self, record: ExecutionRecord) -> Result<(), JournalError> {
        let id = record.id;
        let entry = Arc::new(Mutex::new(ExecutionEntry {
            record,
            nodes: BTreeMap::new(),
        }));
        if self.executions.insert(id, entry).is_some() {
            return Err(JournalError::Duplicate(format!("execution {id}")));
        }
        Ok(())
    }

    async fn transition_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<(), JournalError> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock();
        validate_execution_transition(guard.record.status, status)?;
        guard.record.status = status;
        let now = Utc::now();
        if status == ExecutionStatus::Running && guard.record.started_at.is_none() {
            guard.record.started_at = Some(now);
        }
        if status.is_terminal() {
            guard.record.ended_at = Some(now);
        }
        Ok(())
    }

    async fn set_execution_output(
        &self,
        id: ExecutionId,
        output: Value,
    ) -> Result<(), JournalError> {
        let entry = self.entry(id)?;
        entry.lock().record.output = Some(output);
        Ok(())
    }

    async fn set_execution_error(
        &self,
        id: ExecutionId,
        error: ErrorInfo,
    ) -> Result<(), JournalError> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock();
        if guard.record.error.is_none() {
            guard.record.error = Some(error);
        }
        Ok(())
    }

    async fn create_node_execution(
        &self,
        record: NodeExecutionRecord,
    ) -> Result<(), JournalError> {
        let entry = self.entry(record.execution_id)?;
        let mut guard = entry.lock();
        let key = (record.node_id.clone(), record.attempt);
        if guard.nodes.contains_key(&key) {
            return Err(JournalError::Duplicate(format!(
                "node {} attempt {}",
                key.0, key.1
            )));
        }
        guard.nodes.insert(key, record);
        Ok(())
    }

    async fn transition_node(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeKey,
        attempt: u32,
        transition: NodeTransition,
    ) -> Result<(), JournalError> {
        let entry = self.entry(execution_id)?;
        let mut guard = entry.lock();
        let row = guard
            .nodes
            .get_mut(&(node_id.clone(), attempt))
            .ok_or_else(|| JournalError::NodeNotFound {
                execution: execution_id,
                node: node_id.clone(),
                attempt,
            })?;

        let target = transition.target_status();
        validate_node_transition(row.status, target)?;

        let now = Utc::now();
        row.status = target;
        match transition {
            NodeTransition::Ready { input_snapshot } => {
                row.input_snapshot = Some(input_snapshot);
            }
            NodeTransition::Running => {
                row.started_at = Some(now);
            }
            NodeTransition::Succeeded {
                output,
                duration_ms,
            } => {
                row.output_snapshot = Some(output);
                row.duration_ms = Some(duration_ms);
                row.ended_at = Some(now);
            }
            NodeTransition::Failed { error, duration_ms } => {
                row.error = Some(error);
                row.duration_ms = Some(duration_ms);
                row.ended_at = Some(now);
            }
            NodeTransition::Skipped => {
                row.ended_at = Some(now);
            }
            NodeTransition::Cancelled { error } => {
                row.error = Some(error);
                row.ended_at = Some(now);
            }
        }
        Ok(())
    }

    async fn execution(&self, id: ExecutionId) -> Result<ExecutionRecord, JournalError> {
        let entry = self.entry(id)?;
        let guard = entry.lock();
        Ok(guard.record.clone())
    }

    async fn executions_for(
        &self,
        principal: PrincipalId,
        page: Page,
    ) -> Result<Vec<ExecutionRecord>, JournalError> {
        let mut records: Vec<ExecutionRecord> = self
            .executions
            .iter()
            .filter_map(|entry| {
                let guard = entry.lock();
                (guard.record.principal == principal).then(|| guard.record.clone())
            })
            .collect();
        records.sort_by(|a, b| {
            let a_key = a.started_at.unwrap_or(a.created_at);
            let b_key = b.started_at.unwrap_or(b.created_at);
            b_key.cmp(&a_key)
        });
        Ok(records
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn node_executions(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<NodeExecutionRecord>, JournalError> {
        let entry = self.entry(execution_id)?;
        let guard = entry.lock();
        let mut rows: Vec<NodeExecutionRecord> = guard.nodes.values().cloned().collect();
        rows.sort_by(|a, b| match (a.started_at, b.started_at) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.node_id.cmp(&b.node_id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.node_id.cmp(&b.node_id),
        });
        Ok(rows)
    }

    async fn execution_output(&self, id: ExecutionId) -> Result<Option<Value>, JournalError> {
        let entry = self.entry(id)?;
        let guard = entry.lock();
        Ok(guard.record.output.clone())
    }
}
