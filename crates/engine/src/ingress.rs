//! Ingress: execution requests and flow resolution.
//!
//! The engine's only trigger-start model is an explicit request naming a
//! published `(flow_id, version)`. Actual trigger dispatch (webhooks, cron,
//! queue consumers) is an external collaborator that builds an
//! [`ExecutionRequest`] and calls the engine.

use async_trait::async_trait;
use cascade_core::{FlowId, PrincipalId};
use cascade_flow::FlowDocument;
use cascade_value::Value;
use dashmap::DashMap;

/// A request to start one execution.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// The published flow to run.
    pub flow_id: FlowId,
    /// Which version of it.
    pub version: semver::Version,
    /// The initial input document.
    pub input: Value,
    /// The authenticated caller; owns the resulting execution.
    pub principal: PrincipalId,
}

impl ExecutionRequest {
    /// Create a request.
    #[must_use]
    pub fn new(
        flow_id: FlowId,
        version: semver::Version,
        input: Value,
        principal: PrincipalId,
    ) -> Self {
        Self {
            flow_id,
            version,
            input,
            principal,
        }
    }
}

/// Read access to published flow documents.
///
/// Flow CRUD is an external collaborator; the engine only ever resolves a
/// `(flow_id, version)` pair to an immutable document.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Fetch one published version, or `None`.
    async fn get(&self, flow_id: FlowId, version: &semver::Version) -> Option<FlowDocument>;
}

/// In-memory flow store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryFlowStore {
    flows: DashMap<(FlowId, semver::Version), FlowDocument>,
}

impl MemoryFlowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a document under its own version. Publishing the same
    /// version twice replaces the document (the engine treats published
    /// versions as immutable; this is a test convenience).
    pub fn publish(&self, flow_id: FlowId, doc: FlowDocument) {
        self.flows.insert((flow_id, doc.version.clone()), doc);
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn get(&self, flow_id: FlowId, version: &semver::Version) -> Option<FlowDocument> {
        self.flows
            .get(&(flow_id, version.clone()))
            .map(|doc| doc.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_flow::{FlowDefinition, FlowSettings};

    fn doc(version: semver::Version) -> FlowDocument {
        FlowDocument {
            version,
            definition: FlowDefinition::default(),
            settings: FlowSettings::default(),
        }
    }

    #[tokio::test]
    async fn publish_and_resolve() {
        let store = MemoryFlowStore::new();
        let flow_id = FlowId::v4();
        store.publish(flow_id, doc(semver::Version::new(1, 0, 0)));
        store.publish(flow_id, doc(semver::Version::new(1, 1, 0)));

        assert!(
            store
                .get(flow_id, &semver::Version::new(1, 0, 0))
                .await
                .is_some()
        );
        assert!(
            store
                .get(flow_id, &semver::Version::new(2, 0, 0))
                .await
                .is_none()
        );
        assert!(
            store
                .get(FlowId::v4(), &semver::Version::new(1, 0, 0))
                .await
                .is_none()
        );
    }
}
