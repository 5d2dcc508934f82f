//! Evaluation scope — the read-only snapshot expressions resolve against.

use std::collections::BTreeMap;
use std::sync::Arc;

use cascade_core::{ExecutionId, NodeKey};
use cascade_value::Value;
use chrono::{DateTime, SecondsFormat, Utc};

/// The data visible to one node's expressions.
///
/// Built by the scheduler when the node becomes ready. Node outputs are
/// shared `Arc`s; the scope never copies predecessor data.
#[derive(Debug, Clone)]
pub struct EvaluationScope {
    /// The node's merged fan-in input (`$input`, and the root for bare paths).
    pub input: Arc<Value>,
    /// Outputs of nodes that have finished, by node id (`$nodes.<id>.output`).
    pub node_outputs: BTreeMap<NodeKey, Arc<Value>>,
    /// The running execution's id (`$execution.id`).
    pub execution_id: ExecutionId,
    /// When the execution started (`$execution.startedAt`).
    pub started_at: DateTime<Utc>,
}

impl EvaluationScope {
    /// Create a scope with no node outputs.
    #[must_use]
    pub fn new(input: Arc<Value>, execution_id: ExecutionId, started_at: DateTime<Utc>) -> Self {
        Self {
            input,
            node_outputs: BTreeMap::new(),
            execution_id,
            started_at,
        }
    }

    /// Attach finished-node outputs.
    #[must_use]
    pub fn with_node_outputs(mut self, outputs: BTreeMap<NodeKey, Arc<Value>>) -> Self {
        self.node_outputs = outputs;
        self
    }

    /// The `$execution` namespace as a value.
    #[must_use]
    pub fn execution_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.execution_id.to_string())),
            "startedAt" => Some(Value::String(
                self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_namespace_fields() {
        let id = ExecutionId::v4();
        let scope = EvaluationScope::new(Arc::new(Value::Null), id, Utc::now());

        assert_eq!(
            scope.execution_value("id"),
            Some(Value::String(id.to_string()))
        );
        let started = scope.execution_value("startedAt").unwrap();
        assert!(started.as_str().unwrap().ends_with('Z'));
        assert_eq!(scope.execution_value("unknown"), None);
    }
}
