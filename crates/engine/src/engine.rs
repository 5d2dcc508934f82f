//! The engine facade.

use std::sync::Arc;

use cascade_core::ExecutionId;
use cascade_execution::{
    ExecutionPlan, ExecutionRecord, Journal, MemoryJournal, PlanBuilder,
};
use cascade_expression::Evaluator;
use cascade_handler::{
    Clock, CredentialResolver, Handler, HandlerRegistry, MemoryCredentials, SystemClock,
};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{EventBus, ExecutionEvent};
use crate::ingress::{ExecutionRequest, FlowStore, MemoryFlowStore};
use crate::scheduler::Scheduler;

/// The workflow execution engine.
///
/// Owns the handler registry, the journal, the credential resolver, and the
/// flow store; accepts [`ExecutionRequest`]s, validates them into plans, and
/// schedules the plans with bounded parallelism. Cheap to clone; every
/// component is shared.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<HandlerRegistry>,
    journal: Arc<dyn Journal>,
    credentials: Arc<dyn CredentialResolver>,
    flows: Arc<dyn FlowStore>,
    evaluator: Arc<Evaluator>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    active: Arc<DashMap<ExecutionId, CancellationToken>>,
}

impl Engine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Accept a request, validate it, and run it in the background.
    ///
    /// Returns the new execution id as soon as the PENDING row exists;
    /// progress is observable through the journal and the event bus.
    ///
    /// # Errors
    ///
    /// Unknown flows and plan-time validation failures surface here;
    /// runtime node failures never do.
    pub async fn start_execution(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionId, EngineError> {
        let (plan, record) = self.prepare(&request).await?;
        let execution_id = record.id;
        let token = CancellationToken::new();
        self.active.insert(execution_id, token.clone());

        let scheduler = self.scheduler();
        let active = Arc::clone(&self.active);
        let principal = request.principal;
        let input = request.input;
        tokio::spawn(async move {
            scheduler
                .run(&plan, execution_id, principal, input, token)
                .await;
            active.remove(&execution_id);
        });

        Ok(execution_id)
    }

    /// Accept a request and block until the execution is terminal.
    pub async fn run_to_completion(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionRecord, EngineError> {
        let (plan, record) = self.prepare(&request).await?;
        let execution_id = record.id;
        let token = CancellationToken::new();
        self.active.insert(execution_id, token.clone());

        self.scheduler()
            .run(&plan, execution_id, request.principal, request.input, token)
            .await;
        self.active.remove(&execution_id);

        Ok(self.journal.execution(execution_id).await?)
    }

    /// Request cooperative cancellation of a running execution.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ExecutionNotRunning`] if the id is unknown or
    /// already terminal.
    pub fn cancel(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        match self.active.get(&execution_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(EngineError::ExecutionNotRunning(execution_id)),
        }
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Read access to the journal.
    #[must_use]
    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    /// The handler registry snapshot this engine runs with.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    async fn prepare(
        &self,
        request: &ExecutionRequest,
    ) -> Result<(ExecutionPlan, ExecutionRecord), EngineError> {
        let doc = self
            .flows
            .get(request.flow_id, &request.version)
            .await
            .ok_or_else(|| EngineError::FlowNotFound {
                flow_id: request.flow_id,
                version: request.version.clone(),
            })?;

        let plan = PlanBuilder::build(
            request.flow_id,
            &doc,
            &self.registry,
            self.credentials.as_ref(),
            request.principal,
        )
        .await?;

        let record = ExecutionRecord::new(
            ExecutionId::v4(),
            request.flow_id,
            request.version.clone(),
            request.principal,
            request.input.clone(),
        );
        self.journal.create_execution(record.clone()).await?;
        Ok((plan, record))
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler {
            registry: Arc::clone(&self.registry),
            journal: Arc::clone(&self.journal),
            credentials: Arc::clone(&self.credentials),
            evaluator: Arc::clone(&self.evaluator),
            events: self.events.clone(),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("handlers", &self.registry.len())
            .field("active_executions", &self.active.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    registry: HandlerRegistry,
    journal: Option<Arc<dyn Journal>>,
    credentials: Option<Arc<dyn CredentialResolver>>,
    flows: Option<Arc<dyn FlowStore>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Register one handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.registry.register(handler);
        self
    }

    /// Register the built-in core handler set.
    #[must_use]
    pub fn with_core_handlers(mut self) -> Self {
        crate::handlers::register_core(&mut self.registry);
        self
    }

    /// Use a specific journal (default: in-memory).
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Use a specific credential resolver (default: empty in-memory).
    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Use a specific flow store (default: empty in-memory).
    #[must_use]
    pub fn with_flow_store(mut self, flows: Arc<dyn FlowStore>) -> Self {
        self.flows = Some(flows);
        self
    }

    /// Use a specific clock (default: the system clock). Durations stamped
    /// on journal rows and handler-visible time both come from it.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble the engine.
    #[must_use]
    pub fn build(self) -> Engine {
        let evaluator =
            Evaluator::new().with_env_whitelist(self.config.env_whitelist.iter().cloned());
        Engine {
            registry: Arc::new(self.registry),
            journal: self
                .journal
                .unwrap_or_else(|| Arc::new(MemoryJournal::new())),
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(MemoryCredentials::new())),
            flows: self.flows.unwrap_or_else(|| Arc::new(MemoryFlowStore::new())),
            evaluator: Arc::new(evaluator),
            events: EventBus::default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
            active: Arc::new(DashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{FlowId, PrincipalId};
    use cascade_value::Value;

    #[tokio::test]
    async fn unknown_flow_is_a_synchronous_error() {
        let engine = Engine::builder().with_core_handlers().build();
        let request = ExecutionRequest::new(
            FlowId::v4(),
            semver::Version::new(1, 0, 0),
            Value::empty_object(),
            PrincipalId::v4(),
        );
        let err = engine.start_execution(request).await.unwrap_err();
        assert!(matches!(err, EngineError::FlowNotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_unknown_execution_errors() {
        let engine = Engine::builder().build();
        let err = engine.cancel(ExecutionId::v4()).unwrap_err();
        assert!(matches!(err, EngineError::ExecutionNotRunning(_)));
    }
}
