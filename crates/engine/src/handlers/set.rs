//! Set node: writes configured key/value pairs into its output.

use async_trait::async_trait;
use cascade_core::HandlerKey;
use cascade_handler::{
    FieldDef, FieldKind, Handler, HandlerError, HandlerMetadata, HandlerOutput, NodeContext,
    Schema,
};
use cascade_value::Value;

/// Produces an object from the `fields` config map. Every value is rendered
/// through the evaluator, so entries like
/// `"greeting": "Hello, {{$nodes.who.output.name}}!"` bind prior outputs.
pub struct SetHandler {
    meta: HandlerMetadata,
}

impl SetHandler {
    /// Create the handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: HandlerMetadata::new(
                HandlerKey::new("core.set").expect("static key"),
                "Set",
                "Builds an object from configured fields, rendering templates",
            )
            .with_category("core")
            .with_config_schema(Schema::with_fields(vec![
                FieldDef::new("fields", "Fields", FieldKind::Object).required(),
            ])),
        }
    }
}

impl Default for SetHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for SetHandler {
    fn metadata(&self) -> &HandlerMetadata {
        &self.meta
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HandlerOutput, HandlerError> {
        let rendered = ctx
            .render_config("fields")
            .ok_or_else(|| HandlerError::config("missing `fields` config"))??;
        match rendered {
            Value::Object(_) => Ok(HandlerOutput::new(rendered)),
            other => Err(HandlerError::config(format!(
                "`fields` must render to an object, got {}",
                other.kind()
            ))),
        }
    }
}
