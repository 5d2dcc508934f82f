//! The execution context passed to every handler.

use std::sync::Arc;
use std::time::Instant;

use cascade_core::{CredentialId, ExecutionId, NodeKey, PrincipalId};
use cascade_expression::{EvaluationScope, Evaluator, Mode};
use cascade_value::Value;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::credential::{CredentialError, CredentialPayload, CredentialResolver};
use crate::error::HandlerError;

/// Capability for handler debug output.
///
/// Messages are captured by the engine and attached to the node's journal
/// trail; handlers never write to process logs directly.
pub trait NodeLogger: Send + Sync {
    /// Debug-level message.
    fn debug(&self, message: &str);
    /// Info-level message.
    fn info(&self, message: &str);
    /// Warning.
    fn warn(&self, message: &str);
    /// Error-level message.
    fn error(&self, message: &str);
}

/// Logger that drops everything; the default for bare test contexts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl NodeLogger for NoopLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Capability for reading time, so handlers are clock-mockable.
pub trait Clock: Send + Sync {
    /// Wall-clock now.
    fn now(&self) -> DateTime<Utc>;
    /// Monotonic now, for measuring durations.
    fn monotonic(&self) -> Instant;
}

/// The process clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Everything a handler may touch during one execution.
///
/// Constructed by the engine per node attempt. Handlers must not retain any
/// part of it past `execute`'s return; the input value is shared and
/// immutable.
pub struct NodeContext {
    /// The running execution.
    pub execution_id: ExecutionId,
    /// The node being executed.
    pub node_id: NodeKey,
    /// The principal owning the execution.
    pub principal: PrincipalId,
    /// Which attempt this is (1-based).
    pub attempt: u32,
    /// The node's opaque config from the flow document.
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Merged fan-in input; shared, read-only.
    pub input: Arc<Value>,
    /// Cooperative cancellation signal; poll at natural await points.
    pub cancellation: CancellationToken,
    scope: EvaluationScope,
    evaluator: Arc<Evaluator>,
    credentials: Arc<dyn CredentialResolver>,
    logger: Arc<dyn NodeLogger>,
    clock: Arc<dyn Clock>,
    idempotency_key: String,
}

impl NodeContext {
    /// Create a context. The engine is the only production caller; tests
    /// go through [`crate::testing`] instead.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: ExecutionId,
        node_id: NodeKey,
        principal: PrincipalId,
        attempt: u32,
        config: serde_json::Map<String, serde_json::Value>,
        input: Arc<Value>,
        scope: EvaluationScope,
        evaluator: Arc<Evaluator>,
        credentials: Arc<dyn CredentialResolver>,
        idempotency_key: String,
    ) -> Self {
        Self {
            execution_id,
            node_id,
            principal,
            attempt,
            config,
            input,
            cancellation: CancellationToken::new(),
            scope,
            evaluator,
            credentials,
            logger: Arc::new(NoopLogger),
            clock: Arc::new(SystemClock),
            idempotency_key,
        }
    }

    /// Use an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach a logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn NodeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Attach a clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The derived at-most-once key for this `(execution, node, attempt)`.
    ///
    /// Integration handlers forward it to remote APIs that support
    /// idempotent writes.
    #[must_use]
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    /// Evaluate an expression in lenient mode (missing paths → `Null`).
    pub fn evaluate(&self, expression: &str) -> Result<Value, HandlerError> {
        Ok(self.evaluator.evaluate(expression, &self.scope, Mode::Lenient)?)
    }

    /// Evaluate in strict mode (missing paths are errors).
    pub fn evaluate_strict(&self, expression: &str) -> Result<Value, HandlerError> {
        Ok(self.evaluator.evaluate(expression, &self.scope, Mode::Strict)?)
    }

    /// Render a template string (both `{{...}}` and `${...}` forms).
    pub fn render(&self, template: &str) -> Result<Value, HandlerError> {
        Ok(self.evaluator.render(template, &self.scope, Mode::Lenient)?)
    }

    /// Render one config field through the evaluator. Returns `None` when
    /// the field is absent.
    pub fn render_config(&self, field: &str) -> Option<Result<Value, HandlerError>> {
        self.config.get(field).map(|raw| {
            self.evaluator
                .render_config_value(raw, &self.scope, Mode::Lenient)
                .map_err(Into::into)
        })
    }

    /// Resolve a credential for this execution's principal.
    pub async fn credential(&self, id: CredentialId) -> Result<CredentialPayload, HandlerError> {
        self.credentials
            .resolve(self.principal, id)
            .await
            .map_err(|e| match e {
                CredentialError::Store(msg) => HandlerError::credential(msg),
                other => HandlerError::credential(other.to_string()),
            })
    }

    /// Return an error if cancellation has been requested.
    ///
    /// Handlers should call this in loops and before expensive operations.
    pub fn check_cancelled(&self) -> Result<(), HandlerError> {
        if self.cancellation.is_cancelled() {
            Err(HandlerError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Wall-clock now via the clock capability.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Monotonic now via the clock capability.
    #[must_use]
    pub fn monotonic(&self) -> Instant {
        self.clock.monotonic()
    }

    /// The logging capability.
    #[must_use]
    pub fn logger(&self) -> &dyn NodeLogger {
        self.logger.as_ref()
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("execution_id", &self.execution_id)
            .field("node_id", &self.node_id)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;

    #[test]
    fn evaluate_reads_input() {
        let ctx = context(serde_json::json!({"x": 41}), serde_json::json!({}));
        assert_eq!(ctx.evaluate("x").unwrap(), Value::Int(41));
        assert_eq!(ctx.evaluate("missing").unwrap(), Value::Null);
        assert!(ctx.evaluate_strict("missing").is_err());
    }

    #[test]
    fn render_config_field() {
        let ctx = context(
            serde_json::json!({"name": "Ada"}),
            serde_json::json!({"greeting": "Hello, {{name}}!"}),
        );
        let rendered = ctx.render_config("greeting").unwrap().unwrap();
        assert_eq!(rendered, Value::from("Hello, Ada!"));
        assert!(ctx.render_config("absent").is_none());
    }

    #[test]
    fn check_cancelled_follows_token() {
        let ctx = context(serde_json::json!({}), serde_json::json!({}));
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancellation.cancel();
        let err = ctx.check_cancelled().unwrap_err();
        assert_eq!(err.kind, cascade_core::ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn unknown_credential_is_credential_error() {
        let ctx = context(serde_json::json!({}), serde_json::json!({}));
        let err = ctx.credential(CredentialId::v4()).await.unwrap_err();
        assert_eq!(err.kind, cascade_core::ErrorKind::Credential);
    }

    #[test]
    fn debug_does_not_leak_capabilities() {
        let ctx = context(serde_json::json!({}), serde_json::json!({}));
        let repr = format!("{ctx:?}");
        assert!(repr.contains("NodeContext"));
        assert!(!repr.contains("credentials"));
    }

    /// A clock pinned at construction time.
    struct FixedClock {
        wall: DateTime<Utc>,
        mono: Instant,
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.wall
        }

        fn monotonic(&self) -> Instant {
            self.mono
        }
    }

    #[test]
    fn time_comes_from_the_clock_capability() {
        let wall = "2024-06-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let mono = Instant::now();
        let ctx = context(serde_json::json!({}), serde_json::json!({}))
            .with_clock(Arc::new(FixedClock { wall, mono }));

        assert_eq!(ctx.now(), wall);
        assert_eq!(ctx.monotonic(), mono);
        // The fixed clock keeps returning the same wall time; the system
        // clock would have moved on.
        assert_eq!(ctx.now(), wall);
    }
}
