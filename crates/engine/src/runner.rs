//! Per-node execution: one spawned task per dispatched node.
//!
//! The runner owns the full attempt lifecycle (journal transitions, the
//! effective timeout, the handler-declared retry loop) and reports a single
//! terminal outcome back to the scheduler. The success row is durably
//! journaled *before* the outcome is returned, which is what guarantees a
//! successor never becomes READY ahead of its predecessor's record.

use std::sync::Arc;
use std::time::Duration;

use cascade_core::{ErrorInfo, ErrorKind, ExecutionId, NodeKey, PrincipalId};
use cascade_execution::{
    IdempotencyKey, Journal, NodeExecutionRecord, NodeStatus, NodeTransition,
};
use cascade_expression::{EvaluationScope, Evaluator};
use cascade_handler::{Clock, CredentialResolver, Handler, NodeContext, NodeLogger, RetryPolicy};
use cascade_value::Value;
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, ExecutionEvent};

/// Everything one node task needs, bundled for the spawn.
pub(crate) struct NodeRun {
    pub execution_id: ExecutionId,
    pub node_id: NodeKey,
    pub principal: PrincipalId,
    pub handler: Arc<dyn Handler>,
    pub config: serde_json::Map<String, serde_json::Value>,
    /// The frozen fan-in merge; also the `$input` root of the scope.
    pub input: Arc<Value>,
    pub scope: EvaluationScope,
    pub evaluator: Arc<Evaluator>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub journal: Arc<dyn Journal>,
    pub events: EventBus,
    pub cancellation: CancellationToken,
    pub clock: Arc<dyn Clock>,
    /// min(handler max, per-node config); `None` = unbounded.
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

/// The terminal result the scheduler consumes.
pub(crate) struct NodeOutcome {
    pub node_id: NodeKey,
    pub status: NodeStatus,
    pub output: Option<Arc<Value>>,
    pub error: Option<ErrorInfo>,
}

/// Forwards handler debug output into the engine's tracing stream.
struct TracingLogger {
    execution_id: ExecutionId,
    node_id: NodeKey,
}

impl NodeLogger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }

    fn info(&self, message: &str) {
        tracing::info!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }

    fn error(&self, message: &str) {
        tracing::error!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }
}

impl NodeRun {
    /// Drive the node to a terminal status, retrying per the declared
    /// policy, and journal every step.
    pub(crate) async fn run(self) -> NodeOutcome {
        let max_attempts = self.retry.map_or(1, |r| r.max_attempts);
        let backoff = self.retry.map_or(Duration::ZERO, |r| r.backoff);

        let mut attempt = 1;
        loop {
            // Attempt 1's row was created (and made READY) by the
            // scheduler; retries append their own rows.
            if attempt > 1 {
                let row = NodeExecutionRecord::attempt(
                    self.execution_id,
                    self.node_id.clone(),
                    attempt,
                );
                if let Err(e) = self.journal.create_node_execution(row).await {
                    return self.internal_failure(attempt, e);
                }
                let snapshot = (*self.input).clone();
                if let Err(e) = self
                    .journal
                    .transition_node(
                        self.execution_id,
                        &self.node_id,
                        attempt,
                        NodeTransition::Ready {
                            input_snapshot: snapshot,
                        },
                    )
                    .await
                {
                    return self.internal_failure(attempt, e);
                }
            }

            if let Err(e) = self
                .journal
                .transition_node(
                    self.execution_id,
                    &self.node_id,
                    attempt,
                    NodeTransition::Running,
                )
                .await
            {
                return self.internal_failure(attempt, e);
            }
            self.events.emit(ExecutionEvent::NodeStarted {
                execution_id: self.execution_id,
                node_id: self.node_id.clone(),
                attempt,
                at: self.clock.now(),
            });

            let started = self.clock.monotonic();
            let result = self.invoke_handler(attempt).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                AttemptResult::Success(output) => {
                    if self.cancellation.is_cancelled() {
                        // Non-cooperating handler finished after the
                        // cancellation broadcast: discard its output.
                        let error = ErrorInfo::new(ErrorKind::Cancelled, "cancelled");
                        return self.finish_cancelled(attempt, error, duration_ms).await;
                    }
                    let output = Arc::new(output);
                    if let Err(e) = self
                        .journal
                        .transition_node(
                            self.execution_id,
                            &self.node_id,
                            attempt,
                            NodeTransition::Succeeded {
                                output: (*output).clone(),
                                duration_ms,
                            },
                        )
                        .await
                    {
                        return self.internal_failure(attempt, e);
                    }
                    self.events.emit(ExecutionEvent::NodeFinished {
                        execution_id: self.execution_id,
                        node_id: self.node_id.clone(),
                        attempt,
                        status: NodeStatus::Succeeded,
                        duration_ms,
                        error: None,
                    });
                    return NodeOutcome {
                        node_id: self.node_id,
                        status: NodeStatus::Succeeded,
                        output: Some(output),
                        error: None,
                    };
                }

                AttemptResult::Cancelled(error) => {
                    return self.finish_cancelled(attempt, error, duration_ms).await;
                }

                AttemptResult::Failed(error) => {
                    let retryable = error.kind.is_retryable()
                        && attempt < max_attempts
                        && !self.cancellation.is_cancelled();
                    let failed = self
                        .record_failed(attempt, error.clone(), duration_ms)
                        .await;
                    if let Some(outcome) = failed {
                        return outcome;
                    }
                    if !retryable {
                        return NodeOutcome {
                            node_id: self.node_id,
                            status: NodeStatus::Failed,
                            output: None,
                            error: Some(error),
                        };
                    }
                    tracing::debug!(
                        execution_id = %self.execution_id,
                        node_id = %self.node_id,
                        attempt,
                        "retrying after transient failure"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        () = self.cancellation.cancelled() => {
                            return NodeOutcome {
                                node_id: self.node_id,
                                status: NodeStatus::Failed,
                                output: None,
                                error: Some(error),
                            };
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// One handler invocation under the effective timeout.
    async fn invoke_handler(&self, attempt: u32) -> AttemptResult {
        let idempotency_key =
            IdempotencyKey::derive(self.execution_id, &self.node_id, attempt).to_string();
        let ctx = NodeContext::new(
            self.execution_id,
            self.node_id.clone(),
            self.principal,
            attempt,
            self.config.clone(),
            Arc::clone(&self.input),
            self.scope.clone(),
            Arc::clone(&self.evaluator),
            Arc::clone(&self.credentials),
            idempotency_key,
        )
        .with_cancellation(self.cancellation.child_token())
        .with_logger(Arc::new(TracingLogger {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
        }))
        .with_clock(Arc::clone(&self.clock));

        let invocation = self.handler.execute(ctx);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(result) => result,
                Err(_) => {
                    return AttemptResult::Failed(ErrorInfo::new(
                        ErrorKind::Timeout,
                        format!("node exceeded its {}s timeout", limit.as_secs()),
                    ));
                }
            },
            None => invocation.await,
        };

        match result {
            Ok(output) => AttemptResult::Success(output.output),
            Err(err) if err.kind == ErrorKind::Cancelled => {
                AttemptResult::Cancelled(err.into())
            }
            Err(err) => AttemptResult::Failed(err.into()),
        }
    }

    /// Journal a FAILED attempt. Returns an outcome only if the journal
    /// write itself failed.
    async fn record_failed(
        &self,
        attempt: u32,
        error: ErrorInfo,
        duration_ms: u64,
    ) -> Option<NodeOutcome> {
        if let Err(e) = self
            .journal
            .transition_node(
                self.execution_id,
                &self.node_id,
                attempt,
                NodeTransition::Failed {
                    error: error.clone(),
                    duration_ms,
                },
            )
            .await
        {
            tracing::error!(
                execution_id = %self.execution_id,
                node_id = %self.node_id,
                error = %e,
                "journal write failed while recording node failure"
            );
            return Some(NodeOutcome {
                node_id: self.node_id.clone(),
                status: NodeStatus::Failed,
                output: None,
                error: Some(ErrorInfo::engine_internal()),
            });
        }
        self.events.emit(ExecutionEvent::NodeFinished {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            attempt,
            status: NodeStatus::Failed,
            duration_ms,
            error: Some(error),
        });
        None
    }

    async fn finish_cancelled(
        &self,
        attempt: u32,
        error: ErrorInfo,
        duration_ms: u64,
    ) -> NodeOutcome {
        let transition = NodeTransition::Cancelled {
            error: error.clone(),
        };
        if let Err(e) = self
            .journal
            .transition_node(self.execution_id, &self.node_id, attempt, transition)
            .await
        {
            tracing::error!(
                execution_id = %self.execution_id,
                node_id = %self.node_id,
                error = %e,
                "journal write failed while recording cancellation"
            );
        }
        self.events.emit(ExecutionEvent::NodeFinished {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            attempt,
            status: NodeStatus::Cancelled,
            duration_ms,
            error: Some(error.clone()),
        });
        NodeOutcome {
            node_id: self.node_id.clone(),
            status: NodeStatus::Cancelled,
            output: None,
            error: Some(error),
        }
    }

    fn internal_failure(
        &self,
        attempt: u32,
        error: cascade_execution::JournalError,
    ) -> NodeOutcome {
        // The operator log gets the cause; the journal row (if reachable)
        // and the outcome carry only the opaque payload.
        tracing::error!(
            execution_id = %self.execution_id,
            node_id = %self.node_id,
            attempt,
            error = %error,
            "engine fault while driving node"
        );
        NodeOutcome {
            node_id: self.node_id.clone(),
            status: NodeStatus::Failed,
            output: None,
            error: Some(ErrorInfo::engine_internal()),
        }
    }
}

enum AttemptResult {
    Success(Value),
    Failed(ErrorInfo),
    Cancelled(ErrorInfo),
}
