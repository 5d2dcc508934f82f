//! The uniform handler trait.

use async_trait::async_trait;
use cascade_core::HandlerKey;

use crate::context::NodeContext;
use crate::error::HandlerError;
use crate::metadata::HandlerMetadata;
use crate::result::HandlerOutput;
use crate::schema::Violation;

/// The contract every node type implements.
///
/// Object-safe; the engine stores handlers as `Arc<dyn Handler>` in the
/// registry and shares them across concurrent executions.
///
/// The engine guarantees: the input is immutable for the duration of the
/// call, the cancellation signal is live, credentials referenced in config
/// were authorized at plan time, and the evaluator is safe to call
/// concurrently. Handlers in turn must not mutate inputs, must not retain
/// context capabilities past return, and must report domain failures through
/// [`HandlerError`] rather than panicking.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Static metadata: key, schema, ports, trigger flag, hints.
    fn metadata(&self) -> &HandlerMetadata;

    /// Static per-node config validation, run by the plan builder.
    ///
    /// Defaults to schema validation; handlers with cross-field rules
    /// override and extend.
    fn validate_config(
        &self,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<Violation> {
        self.metadata().config_schema.validate(config)
    }

    /// Perform the node's work.
    ///
    /// The engine measures the duration itself and journals the outcome.
    async fn execute(&self, ctx: NodeContext) -> Result<HandlerOutput, HandlerError>;
}

/// Convenience accessors mirroring the metadata, available on trait objects.
impl dyn Handler {
    /// The registry key.
    #[must_use]
    pub fn key(&self) -> &HandlerKey {
        &self.metadata().key
    }

    /// Whether this handler may start a flow.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.metadata().is_trigger
    }

    /// Whether this handler performs async I/O.
    #[must_use]
    pub fn supports_async(&self) -> bool {
        self.metadata().supports_async
    }
}
