//! The DAG scheduler: drives one plan to a terminal status.
//!
//! Ready-set advancement: the scheduler keeps a `remaining_in_degree` map
//! seeded from the plan, marks a node READY the moment its last predecessor
//! succeeds (freezing the fan-in merge into the journal), and dispatches
//! READY nodes subject to the flow's concurrency policy — up to
//! `max_parallel` tasks under `allow`, exactly one at a time under
//! `serialize` (topological order, ties broken by node key; the ready set is
//! ordered by `(topo index, key)`, which yields that order deterministically).
//!
//! A failed node prunes its forward closure to SKIPPED; independent branches
//! keep running. Cancellation (external, or broadcast at the execution
//! deadline) stops dispatch immediately and lets running handlers drain
//! cooperatively.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use cascade_core::{ErrorInfo, ErrorKind, ExecutionId, NodeKey, PrincipalId};
use cascade_execution::{
    ExecutionPlan, ExecutionStatus, Journal, NodeExecutionRecord, NodeStatus, NodeTransition,
    PlanNode,
};
use cascade_expression::{EvaluationScope, Evaluator};
use cascade_flow::ConcurrencyMode;
use cascade_handler::{Clock, CredentialResolver, HandlerRegistry};
use cascade_value::{Object, Value};
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::EngineConfig;
use crate::events::{EventBus, ExecutionEvent};
use crate::runner::{NodeOutcome, NodeRun};

/// Shared engine components the scheduler borrows for one run.
pub(crate) struct Scheduler {
    pub registry: Arc<HandlerRegistry>,
    pub journal: Arc<dyn Journal>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub evaluator: Arc<Evaluator>,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
}

/// Per-run mutable state.
struct RunState {
    remaining_in_degree: BTreeMap<NodeKey, usize>,
    statuses: BTreeMap<NodeKey, NodeStatus>,
    outputs: BTreeMap<NodeKey, Arc<Value>>,
    /// Frozen input snapshots of READY nodes, consumed at dispatch.
    ready_inputs: BTreeMap<NodeKey, Arc<Value>>,
    /// Dispatch queue ordered by `(topo index, node key)`.
    ready: BTreeSet<(usize, NodeKey)>,
    running: usize,
}

impl Scheduler {
    /// Run the plan to completion and leave the journal terminal.
    pub(crate) async fn run(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        principal: PrincipalId,
        input: Value,
        cancel: CancellationToken,
    ) {
        let span = tracing::info_span!("execution", %execution_id, flow = %plan.flow_hash);
        if let Err(error) = self
            .drive(plan, execution_id, principal, input, cancel)
            .instrument(span)
            .await
        {
            // A journal fault mid-run: record the opaque failure and give up.
            tracing::error!(%execution_id, error = %error, "scheduler aborted on journal fault");
            let _ = self
                .journal
                .set_execution_error(execution_id, ErrorInfo::engine_internal())
                .await;
            let _ = self
                .journal
                .transition_execution(execution_id, ExecutionStatus::Failed)
                .await;
        }
    }

    async fn drive(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        principal: PrincipalId,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<(), cascade_execution::JournalError> {
        self.journal
            .transition_execution(execution_id, ExecutionStatus::Running)
            .await?;
        let started_at = Utc::now();
        self.events.emit(ExecutionEvent::ExecutionStarted {
            execution_id,
            at: started_at,
        });

        // Discover every node up front: one WAITING row each.
        for node_id in &plan.topo_order {
            self.journal
                .create_node_execution(NodeExecutionRecord::new(execution_id, node_id.clone()))
                .await?;
        }

        let mut state = RunState {
            remaining_in_degree: plan
                .nodes
                .iter()
                .map(|(key, node)| (key.clone(), node.in_degree))
                .collect(),
            statuses: plan
                .nodes
                .keys()
                .map(|key| (key.clone(), NodeStatus::Waiting))
                .collect(),
            outputs: BTreeMap::new(),
            ready_inputs: BTreeMap::new(),
            ready: BTreeSet::new(),
            running: 0,
        };

        let input = Arc::new(input);
        let trigger = plan.trigger.clone();
        self.mark_ready(plan, execution_id, &mut state, &trigger, &input)
            .await?;

        let deadline = plan
            .timeout_seconds
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
        let mut timed_out = false;
        let mut cancel_observed = false;
        let mut external_cancel = false;
        let mut tasks: JoinSet<NodeOutcome> = JoinSet::new();

        loop {
            if !cancel.is_cancelled() {
                self.dispatch(
                    plan,
                    execution_id,
                    principal,
                    &mut state,
                    &mut tasks,
                    started_at,
                    &cancel,
                );
            }

            if state.running == 0 && (state.ready.is_empty() || cancel.is_cancelled()) {
                break;
            }

            tokio::select! {
                joined = tasks.join_next(), if state.running > 0 => {
                    let Some(joined) = joined else { continue };
                    state.running -= 1;
                    match joined {
                        Ok(outcome) => {
                            self.settle(plan, execution_id, &mut state, outcome, &input)
                                .await?;
                        }
                        Err(join_error) => {
                            // A panicking handler task: fail the run, the
                            // cause goes to the operator log only.
                            tracing::error!(%execution_id, error = %join_error, "node task panicked");
                            self.journal
                                .set_execution_error(execution_id, ErrorInfo::engine_internal())
                                .await?;
                            cancel.cancel();
                        }
                    }
                }
                () = cancel.cancelled(), if !cancel_observed => {
                    // Dispatch stops here; running handlers drain
                    // cooperatively, and their forward closures are pruned
                    // as they settle.
                    cancel_observed = true;
                    external_cancel = !timed_out;
                    self.events.emit(ExecutionEvent::CancellationRequested {
                        execution_id,
                        reason: if timed_out { "execution timeout".into() } else { "cancel requested".into() },
                    });
                }
                () = tokio::time::sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() && !timed_out && !cancel_observed => {
                    timed_out = true;
                    self.journal
                        .set_execution_error(
                            execution_id,
                            ErrorInfo::new(ErrorKind::Timeout, "execution exceeded its timeout"),
                        )
                        .await?;
                    cancel.cancel();
                }
            }
        }

        // Nodes never reached before cancellation landed: not pruned by any
        // failed predecessor, never started. They end CANCELLED.
        if cancel.is_cancelled() {
            self.cancel_pending(plan, execution_id, &mut state).await?;
        }

        self.finalize(
            plan,
            execution_id,
            &state,
            timed_out,
            external_cancel,
        )
        .await
    }

    /// Spawn as many ready nodes as the concurrency policy allows.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        principal: PrincipalId,
        state: &mut RunState,
        tasks: &mut JoinSet<NodeOutcome>,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) {
        let cap = match plan.concurrency {
            ConcurrencyMode::Allow => self.config.max_parallel.max(1),
            ConcurrencyMode::Serialize => 1,
        };

        while state.running < cap {
            let Some((_, node_id)) = state.ready.pop_first() else {
                break;
            };
            let plan_node = &plan.nodes[&node_id];
            // The registry is immutable once shared with the engine, and the
            // plan builder resolved every type against it.
            let handler = self
                .registry
                .get(&plan_node.handler)
                .expect("plan validated every handler type");

            let node_input = state
                .ready_inputs
                .remove(&node_id)
                .expect("ready node has a frozen input");
            let scope = EvaluationScope {
                input: Arc::clone(&node_input),
                node_outputs: state.outputs.clone(),
                execution_id,
                started_at,
            };

            state.statuses.insert(node_id.clone(), NodeStatus::Running);
            state.running += 1;
            tasks.spawn(
                NodeRun {
                    execution_id,
                    node_id: node_id.clone(),
                    principal,
                    handler: Arc::clone(handler),
                    config: plan_node.config.clone(),
                    input: node_input,
                    scope,
                    evaluator: Arc::clone(&self.evaluator),
                    credentials: Arc::clone(&self.credentials),
                    journal: Arc::clone(&self.journal),
                    events: self.events.clone(),
                    cancellation: cancel.child_token(),
                    clock: Arc::clone(&self.clock),
                    timeout: effective_timeout(plan_node, handler.metadata().max_timeout),
                    retry: handler.metadata().retry,
                }
                .run(),
            );
        }
    }

    /// Absorb one terminal node outcome: propagate fan-out or prune.
    async fn settle(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        state: &mut RunState,
        outcome: NodeOutcome,
        input: &Arc<Value>,
    ) -> Result<(), cascade_execution::JournalError> {
        let node_id = outcome.node_id.clone();
        state.statuses.insert(node_id.clone(), outcome.status);

        match outcome.status {
            NodeStatus::Succeeded => {
                let output = outcome.output.unwrap_or_else(|| Arc::new(Value::Null));
                state.outputs.insert(node_id.clone(), output);
                // Fan-out: the successor's in-degree drops; at zero it is
                // ready, and its merge is frozen right now.
                for successor in plan.nodes[&node_id].successors.clone() {
                    let remaining = state
                        .remaining_in_degree
                        .get_mut(&successor)
                        .expect("successor is in the plan");
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 && state.statuses[&successor] == NodeStatus::Waiting {
                        self.mark_ready(plan, execution_id, state, &successor, input)
                            .await?;
                    }
                }
            }
            _ => {
                self.skip_descendants(plan, execution_id, state, &node_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Freeze a node's fan-in merge and queue it for dispatch.
    async fn mark_ready(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        state: &mut RunState,
        node_id: &NodeKey,
        execution_input: &Arc<Value>,
    ) -> Result<(), cascade_execution::JournalError> {
        let snapshot = merge_fan_in(&plan.nodes[node_id], &state.outputs, execution_input);
        self.journal
            .transition_node(
                execution_id,
                node_id,
                1,
                NodeTransition::Ready {
                    input_snapshot: (*snapshot).clone(),
                },
            )
            .await?;
        state.statuses.insert(node_id.clone(), NodeStatus::Ready);
        state.ready_inputs.insert(node_id.clone(), snapshot);
        let topo = plan.topo_index(node_id).expect("plan node has an index");
        state.ready.insert((topo, node_id.clone()));
        Ok(())
    }

    /// SKIP every not-yet-started node downstream of a failed one.
    async fn skip_descendants(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        state: &mut RunState,
        failed: &NodeKey,
    ) -> Result<(), cascade_execution::JournalError> {
        let mut stack: Vec<NodeKey> = plan.nodes[failed].successors.clone();
        let mut seen: BTreeSet<NodeKey> = BTreeSet::new();
        while let Some(node_id) = stack.pop() {
            if !seen.insert(node_id.clone()) {
                continue;
            }
            stack.extend(plan.nodes[&node_id].successors.iter().cloned());

            match state.statuses[&node_id] {
                NodeStatus::Waiting | NodeStatus::Ready => {
                    self.journal
                        .transition_node(execution_id, &node_id, 1, NodeTransition::Skipped)
                        .await?;
                    if let Some(topo) = plan.topo_index(&node_id) {
                        state.ready.remove(&(topo, node_id.clone()));
                    }
                    state.ready_inputs.remove(&node_id);
                    state.statuses.insert(node_id.clone(), NodeStatus::Skipped);
                    self.events.emit(ExecutionEvent::NodeSkipped {
                        execution_id,
                        node_id,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// CANCEL every node that never started and was not pruned.
    async fn cancel_pending(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        state: &mut RunState,
    ) -> Result<(), cascade_execution::JournalError> {
        let pending: Vec<NodeKey> = state
            .statuses
            .iter()
            .filter(|(_, status)| matches!(status, NodeStatus::Waiting | NodeStatus::Ready))
            .map(|(key, _)| key.clone())
            .collect();
        for node_id in pending {
            self.journal
                .transition_node(
                    execution_id,
                    &node_id,
                    1,
                    NodeTransition::Cancelled {
                        error: ErrorInfo::new(ErrorKind::Cancelled, "cancelled before start"),
                    },
                )
                .await?;
            if let Some(topo) = plan.topo_index(&node_id) {
                state.ready.remove(&(topo, node_id.clone()));
            }
            state.ready_inputs.remove(&node_id);
            state.statuses.insert(node_id, NodeStatus::Cancelled);
        }
        state.ready.clear();
        Ok(())
    }

    /// Decide the terminal status, assemble the output, set the top error.
    async fn finalize(
        &self,
        plan: &ExecutionPlan,
        execution_id: ExecutionId,
        state: &RunState,
        timed_out: bool,
        external_cancel: bool,
    ) -> Result<(), cascade_execution::JournalError> {
        let any_failed = state
            .statuses
            .values()
            .any(|s| matches!(s, NodeStatus::Failed | NodeStatus::Cancelled));

        let final_status = if external_cancel {
            ExecutionStatus::Cancelled
        } else if timed_out || any_failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        match final_status {
            ExecutionStatus::Completed => {
                let output = assemble_output(plan, &state.outputs);
                self.journal
                    .set_execution_output(execution_id, output)
                    .await?;
            }
            ExecutionStatus::Cancelled => {
                self.journal
                    .set_execution_error(
                        execution_id,
                        ErrorInfo::new(ErrorKind::Cancelled, "execution cancelled"),
                    )
                    .await?;
            }
            _ => {
                // First failed node in started_at order owns the top error.
                // (The timeout path already wrote its own; first write wins.)
                let rows = self.journal.node_executions(execution_id).await?;
                if let Some(first_failed) = rows
                    .iter()
                    .filter(|row| row.status == NodeStatus::Failed)
                    .find(|row| row.error.is_some())
                {
                    self.journal
                        .set_execution_error(
                            execution_id,
                            first_failed.error.clone().expect("filtered on error"),
                        )
                        .await?;
                }
            }
        }

        self.journal
            .transition_execution(execution_id, final_status)
            .await?;
        self.events.emit(ExecutionEvent::ExecutionFinished {
            execution_id,
            status: final_status,
            at: Utc::now(),
        });
        tracing::info!(%execution_id, status = %final_status, "execution finished");
        Ok(())
    }
}

/// Merge predecessor outputs into a node's input document.
///
/// Zero predecessors (the trigger): the execution input. One predecessor:
/// that output, plus its keyed entry. Several: an object keyed by
/// predecessor id, in key order.
fn merge_fan_in(
    node: &PlanNode,
    outputs: &BTreeMap<NodeKey, Arc<Value>>,
    execution_input: &Arc<Value>,
) -> Arc<Value> {
    match node.predecessors.as_slice() {
        [] => Arc::clone(execution_input),
        [only] => {
            let output = outputs.get(only).cloned().unwrap_or_default();
            let mut merged = match &*output {
                Value::Object(map) => map.clone(),
                _ => Object::new(),
            };
            merged.insert(only.to_string(), (*output).clone());
            Arc::new(Value::Object(merged))
        }
        many => Arc::new(Value::Object(
            many.iter()
                .map(|pred| {
                    let output = outputs.get(pred).cloned().unwrap_or_default();
                    (pred.to_string(), (*output).clone())
                })
                .collect(),
        )),
    }
}

/// The union of terminal node outputs, keyed by terminal node id.
fn assemble_output(plan: &ExecutionPlan, outputs: &BTreeMap<NodeKey, Arc<Value>>) -> Value {
    Value::Object(
        plan.terminals
            .iter()
            .map(|terminal| {
                let value = outputs
                    .get(terminal)
                    .map(|v| (**v).clone())
                    .unwrap_or_default();
                (terminal.to_string(), value)
            })
            .collect(),
    )
}

/// Effective node timeout: min of the handler-declared ceiling and the
/// per-node config value.
///
/// The flow-wide setting is deliberately not folded in — it is enforced
/// once, at the execution deadline, through the cancellation broadcast, so
/// a node interrupted by it ends CANCELLED rather than racing its own
/// TIMEOUT at the same instant.
fn effective_timeout(node: &PlanNode, handler_max: Option<Duration>) -> Option<Duration> {
    [handler_max, node.timeout_seconds.map(Duration::from_secs)]
        .into_iter()
        .flatten()
        .min()
}

fn far_future() -> tokio::time::Instant {
    tokio::time::Instant::now() + Duration::from_secs(86_400 * 365)
}
