//! Merge node: emits its fan-in snapshot unchanged.

use async_trait::async_trait;
use cascade_core::HandlerKey;
use cascade_handler::{Handler, HandlerError, HandlerMetadata, HandlerOutput, NodeContext};

/// Aggregation point for fan-in: the engine has already merged all
/// predecessor outputs into this node's input (keyed by predecessor id),
/// and this handler passes that merge downstream as its own output.
pub struct MergeHandler {
    meta: HandlerMetadata,
}

impl MergeHandler {
    /// Create the handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: HandlerMetadata::new(
                HandlerKey::new("core.merge").expect("static key"),
                "Merge",
                "Emits the merged outputs of all predecessors",
            )
            .with_category("core"),
        }
    }
}

impl Default for MergeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for MergeHandler {
    fn metadata(&self) -> &HandlerMetadata {
        &self.meta
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::new((*ctx.input).clone()))
    }
}
