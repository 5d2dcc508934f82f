//! Manual trigger.

use async_trait::async_trait;
use cascade_core::HandlerKey;
use cascade_handler::{Handler, HandlerError, HandlerMetadata, HandlerOutput, NodeContext};

/// The explicit start node: passes the execution's initial input through
/// unchanged. The actual start signal (API call, webhook, cron) is whatever
/// called the engine's ingress.
pub struct ManualTriggerHandler {
    meta: HandlerMetadata,
}

impl ManualTriggerHandler {
    /// Create the handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: HandlerMetadata::new(
                HandlerKey::new("core.manual_trigger").expect("static key"),
                "Manual Trigger",
                "Starts the flow with the caller-supplied input",
            )
            .with_category("core")
            .trigger(),
        }
    }
}

impl Default for ManualTriggerHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for ManualTriggerHandler {
    fn metadata(&self) -> &HandlerMetadata {
        &self.meta
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::new((*ctx.input).clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_handler::testing::context;
    use cascade_value::Value;

    #[tokio::test]
    async fn passes_input_through() {
        let handler = ManualTriggerHandler::new();
        let ctx = context(serde_json::json!({"seed": 7}), serde_json::json!({}));
        let out = handler.execute(ctx).await.unwrap();
        assert_eq!(out.output, Value::from_json(serde_json::json!({"seed": 7})));
    }

    #[test]
    fn is_a_trigger_without_inputs() {
        let handler = ManualTriggerHandler::new();
        assert!(handler.metadata().is_trigger);
        assert!(handler.metadata().interface.inputs.is_empty());
    }
}
