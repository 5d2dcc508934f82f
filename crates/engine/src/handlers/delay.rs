//! Delay node: waits a configured number of seconds, cooperatively.

use std::time::Duration;

use async_trait::async_trait;
use cascade_core::HandlerKey;
use cascade_handler::{
    FieldDef, FieldKind, Handler, HandlerError, HandlerMetadata, HandlerOutput, NodeContext,
    Schema,
};

/// Sleeps `config.seconds`, polling the cancellation signal the whole time,
/// then passes its input through. Useful for rate pacing and as the
/// canonical slow node in timeout tests.
pub struct DelayHandler {
    meta: HandlerMetadata,
}

impl DelayHandler {
    /// Create the handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: HandlerMetadata::new(
                HandlerKey::new("core.delay").expect("static key"),
                "Delay",
                "Waits the configured number of seconds",
            )
            .with_category("core")
            .asynchronous()
            .with_config_schema(Schema::with_fields(vec![
                FieldDef::new("seconds", "Seconds", FieldKind::Number)
                    .required()
                    .with_range(Some(0.0), Some(86_400.0)),
            ])),
        }
    }
}

impl Default for DelayHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for DelayHandler {
    fn metadata(&self) -> &HandlerMetadata {
        &self.meta
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HandlerOutput, HandlerError> {
        let seconds = ctx
            .config
            .get("seconds")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| HandlerError::config("missing or non-numeric `seconds`"))?;
        if !(0.0..=86_400.0).contains(&seconds) {
            return Err(HandlerError::config("`seconds` out of range"));
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs_f64(seconds)) => {
                Ok(HandlerOutput::new((*ctx.input).clone()))
            }
            () = ctx.cancellation.cancelled() => Err(HandlerError::cancelled()),
        }
    }
}
