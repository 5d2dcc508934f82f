//! The declarative flow document.
//!
//! Field names follow the published JSON format: node `type`, edge
//! `sourcePort` / `targetPort`, settings `timeout` (seconds). The node
//! `data.config` map is deliberately schema-free here; the handler named by
//! `node.type` is the sole type authority for its own config.

use cascade_core::{HandlerKey, NodeKey};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// How ready nodes of one execution may be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// Ready nodes run in parallel up to the engine's per-execution limit.
    #[default]
    Allow,
    /// At most one node runs at any moment; selection is deterministic.
    Serialize,
}

/// Execution settings carried by the flow document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowSettings {
    /// Concurrency policy for ready nodes.
    #[serde(default)]
    pub concurrency: ConcurrencyMode,
    /// Execution-wide wall-clock budget in seconds. `None` means unbounded.
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Label and configuration attached to a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeData {
    /// Display label, opaque to the engine.
    #[serde(default)]
    pub label: String,
    /// Handler-owned configuration map.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// One node of the flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Graph-unique id.
    pub id: NodeKey,
    /// Handler registry key.
    #[serde(rename = "type")]
    pub handler: HandlerKey,
    /// Editor canvas position; opaque to the engine, preserved verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub position: serde_json::Value,
    /// Label and config.
    #[serde(default)]
    pub data: NodeData,
}

impl NodeSpec {
    /// Create a node with empty data, mainly for tests and builders.
    pub fn new(id: NodeKey, handler: HandlerKey) -> Self {
        Self {
            id,
            handler,
            position: serde_json::Value::Null,
            data: NodeData::default(),
        }
    }

    /// Attach a config map.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Map<String, serde_json::Value>) -> Self {
        self.data.config = config;
        self
    }
}

fn default_source_port() -> String {
    "output".to_owned()
}

fn default_target_port() -> String {
    "input".to_owned()
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Unique edge id within the document.
    pub id: String,
    /// Source node id.
    pub source: NodeKey,
    /// Target node id.
    pub target: NodeKey,
    /// Output port on the source node.
    #[serde(default = "default_source_port", rename = "sourcePort")]
    pub source_port: String,
    /// Input port on the target node.
    #[serde(default = "default_target_port", rename = "targetPort")]
    pub target_port: String,
}

impl EdgeSpec {
    /// Create an edge on the default port pair.
    pub fn new(id: impl Into<String>, source: NodeKey, target: NodeKey) -> Self {
        Self {
            id: id.into(),
            source,
            target,
            source_port: default_source_port(),
            target_port: default_target_port(),
        }
    }
}

/// The `definition` block: nodes and edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDefinition {
    /// Graph nodes.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Graph edges.
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

/// A published flow document. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDocument {
    /// Document version (semver).
    pub version: semver::Version,
    /// Nodes and edges.
    pub definition: FlowDefinition,
    /// Execution settings.
    #[serde(default)]
    pub settings: FlowSettings,
}

impl FlowDocument {
    /// Parse a document from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        serde_json::from_str(json).map_err(|e| FlowError::Parse(e.to_string()))
    }

    /// Serialize to the canonical JSON form used for content addressing.
    ///
    /// Map keys are emitted in sorted order (serde_json's default map), so
    /// equal documents produce identical bytes.
    pub fn canonical_json(&self) -> Result<Vec<u8>, FlowError> {
        serde_json::to_vec(self).map_err(|e| FlowError::Parse(e.to_string()))
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeKey) -> Option<&NodeSpec> {
        self.definition.nodes.iter().find(|n| &n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    const CANONICAL: &str = r#"{
        "version": "1.2.0",
        "definition": {
            "nodes": [
                {
                    "id": "trigger",
                    "type": "core.manual_trigger",
                    "position": {"x": 0, "y": 0},
                    "data": {"label": "Start", "config": {}}
                },
                {
                    "id": "greet",
                    "type": "core.set",
                    "data": {"label": "Greet", "config": {"fields": {"text": "hello"}}}
                }
            ],
            "edges": [
                {"id": "e1", "source": "trigger", "target": "greet"}
            ]
        },
        "settings": {"concurrency": "allow", "timeout": 30}
    }"#;

    #[test]
    fn parses_canonical_document() {
        let doc = FlowDocument::from_json(CANONICAL).unwrap();
        assert_eq!(doc.version, semver::Version::new(1, 2, 0));
        assert_eq!(doc.definition.nodes.len(), 2);
        assert_eq!(doc.definition.edges.len(), 1);
        assert_eq!(doc.settings.concurrency, ConcurrencyMode::Allow);
        assert_eq!(doc.settings.timeout_seconds, Some(30));
    }

    #[test]
    fn edge_ports_default() {
        let doc = FlowDocument::from_json(CANONICAL).unwrap();
        let edge = &doc.definition.edges[0];
        assert_eq!(edge.source_port, "output");
        assert_eq!(edge.target_port, "input");
    }

    #[test]
    fn explicit_ports_are_kept() {
        let json = r#"{"id": "e2", "source": "a", "target": "b",
                       "sourcePort": "true", "targetPort": "left"}"#;
        let edge: EdgeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(edge.source_port, "true");
        assert_eq!(edge.target_port, "left");
    }

    #[test]
    fn settings_default_when_absent() {
        let json = r#"{"version": "0.1.0", "definition": {"nodes": [], "edges": []}}"#;
        let doc = FlowDocument::from_json(json).unwrap();
        assert_eq!(doc.settings.concurrency, ConcurrencyMode::Allow);
        assert_eq!(doc.settings.timeout_seconds, None);
    }

    #[test]
    fn unknown_top_level_field_rejected() {
        let json = r#"{"version": "0.1.0", "definition": {"nodes": [], "edges": []},
                       "extra": true}"#;
        assert!(FlowDocument::from_json(json).is_err());
    }

    #[test]
    fn invalid_node_id_rejected_at_parse() {
        let json = r#"{"version": "0.1.0", "definition": {"nodes": [
            {"id": "bad id", "type": "core.set"}
        ], "edges": []}}"#;
        assert!(FlowDocument::from_json(json).is_err());
    }

    #[test]
    fn serialize_mode_parses() {
        let json = r#"{"version": "0.1.0",
                       "definition": {"nodes": [], "edges": []},
                       "settings": {"concurrency": "serialize"}}"#;
        let doc = FlowDocument::from_json(json).unwrap();
        assert_eq!(doc.settings.concurrency, ConcurrencyMode::Serialize);
    }

    #[test]
    fn position_is_preserved_verbatim() {
        let doc = FlowDocument::from_json(CANONICAL).unwrap();
        let node = doc.node(&key("trigger")).unwrap();
        assert_eq!(node.position, serde_json::json!({"x": 0, "y": 0}));
    }

    #[test]
    fn canonical_json_is_stable() {
        let doc = FlowDocument::from_json(CANONICAL).unwrap();
        assert_eq!(
            doc.canonical_json().unwrap(),
            doc.clone().canonical_json().unwrap()
        );
    }
}
