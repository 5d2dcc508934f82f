//! Handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use cascade_core::HandlerKey;

use crate::handler::Handler;
use crate::metadata::HandlerMetadata;

/// Type-erased registry mapping node-type keys to handlers.
///
/// Populated at engine startup; the plan builder resolves `node.type`
/// against it and the scheduler fetches handlers from it. Handlers are
/// `Arc<dyn Handler>` so concurrent executions share one instance.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its metadata key. Overwrites any existing
    /// handler with the same key.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        let key = handler.metadata().key.clone();
        self.handlers.insert(key, handler);
    }

    /// Look up a handler by key.
    #[must_use]
    pub fn get(&self, key: &HandlerKey) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(key)
    }

    /// Returns `true` if the key is registered.
    #[must_use]
    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.handlers.contains_key(key)
    }

    /// Metadata of every registered handler.
    #[must_use]
    pub fn list(&self) -> Vec<&HandlerMetadata> {
        self.handlers.values().map(|h| h.metadata()).collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Remove a handler. Returns the removed instance, if any.
    pub fn unregister(&mut self, key: &HandlerKey) -> Option<Arc<dyn Handler>> {
        self.handlers.remove(key)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("count", &self.handlers.len())
            .field("keys", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeContext;
    use crate::error::HandlerError;
    use crate::result::HandlerOutput;
    use async_trait::async_trait;

    struct Dummy(HandlerMetadata);

    #[async_trait]
    impl Handler for Dummy {
        fn metadata(&self) -> &HandlerMetadata {
            &self.0
        }

        async fn execute(&self, _ctx: NodeContext) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::empty())
        }
    }

    fn make(key: &str) -> Arc<dyn Handler> {
        Arc::new(Dummy(HandlerMetadata::new(
            HandlerKey::new(key).unwrap(),
            key,
            "test",
        )))
    }

    #[test]
    fn empty_registry() {
        let reg = HandlerRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
        assert!(!reg.contains(&HandlerKey::new("missing").unwrap()));
    }

    #[test]
    fn register_and_get() {
        let mut reg = HandlerRegistry::new();
        reg.register(make("core.set"));
        reg.register(make("core.merge"));

        assert_eq!(reg.len(), 2);
        let key = HandlerKey::new("core.set").unwrap();
        assert!(reg.contains(&key));
        assert_eq!(reg.get(&key).unwrap().metadata().key, key);
    }

    #[test]
    fn register_overwrites_same_key() {
        let mut reg = HandlerRegistry::new();
        reg.register(make("core.set"));
        reg.register(make("core.set"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unregister_removes() {
        let mut reg = HandlerRegistry::new();
        reg.register(make("core.set"));
        let key = HandlerKey::new("core.set").unwrap();
        assert!(reg.unregister(&key).is_some());
        assert!(reg.unregister(&key).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn list_exposes_metadata() {
        let mut reg = HandlerRegistry::new();
        reg.register(make("a"));
        reg.register(make("b"));
        let mut names: Vec<&str> = reg.list().iter().map(|m| m.key.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }
}
