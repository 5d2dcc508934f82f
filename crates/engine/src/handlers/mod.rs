//! Built-in core handlers.
//!
//! The minimal node set the engine ships with: a manual trigger, data
//! shaping (`core.set`, `core.merge`), a cooperative delay, and the
//! multi-operation `core.kv` store that doubles as the reference
//! implementation of the `(resource, operation)` sub-protocol. External
//! integrations register their own handlers beside these.

pub mod delay;
pub mod kv;
pub mod manual_trigger;
pub mod merge;
pub mod set;

use std::sync::Arc;

use cascade_handler::{HandlerRegistry, OperationAdapter};

pub use delay::DelayHandler;
pub use kv::{KvClient, KvHandler, KvParams};
pub use manual_trigger::ManualTriggerHandler;
pub use merge::MergeHandler;
pub use set::SetHandler;

/// Register the core handler set.
pub fn register_core(registry: &mut HandlerRegistry) {
    registry.register(Arc::new(ManualTriggerHandler::new()));
    registry.register(Arc::new(SetHandler::new()));
    registry.register(Arc::new(MergeHandler::new()));
    registry.register(Arc::new(DelayHandler::new()));
    registry.register(Arc::new(OperationAdapter::new(KvHandler::new())));
}
