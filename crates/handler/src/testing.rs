//! Test support for handler implementations.
//!
//! Building a full [`NodeContext`] requires the evaluator, a credential
//! resolver, and scope plumbing that handler unit tests do not care about.
//! [`context`] wires a bare context over a JSON input and config so a
//! handler's `execute` can be driven directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use cascade_core::{ExecutionId, NodeKey, PrincipalId};
use cascade_expression::{EvaluationScope, Evaluator};
use cascade_value::Value;
use chrono::Utc;

use crate::context::NodeContext;
use crate::credential::MemoryCredentials;

/// A context over the given input and config, with empty capabilities.
#[must_use]
pub fn context(input: serde_json::Value, config: serde_json::Value) -> NodeContext {
    context_with_outputs(input, config, BTreeMap::new())
}

/// Like [`context`], with prior node outputs visible to `$nodes`.
#[must_use]
pub fn context_with_outputs(
    input: serde_json::Value,
    config: serde_json::Value,
    node_outputs: BTreeMap<NodeKey, Arc<Value>>,
) -> NodeContext {
    let input = Arc::new(Value::from_json(input));
    let scope = EvaluationScope {
        input: Arc::clone(&input),
        node_outputs,
        execution_id: ExecutionId::v4(),
        started_at: Utc::now(),
    };
    NodeContext::new(
        scope.execution_id,
        NodeKey::new("node").expect("static key"),
        PrincipalId::v4(),
        1,
        config.as_object().cloned().unwrap_or_default(),
        input,
        scope,
        Arc::new(Evaluator::new()),
        Arc::new(MemoryCredentials::new()),
        "test-idempotency-key".to_owned(),
    )
}
