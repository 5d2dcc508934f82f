//! Execution planning.
//!
//! [`PlanBuilder`] turns a flow document plus a registry snapshot into an
//! [`ExecutionPlan`], or a [`PlanError`] carrying *every* violation found —
//! validation never stops at the first problem. The plan is pure data:
//! content-addressed by the document, serializable, and free of closures or
//! live resources.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cascade_core::{FlowId, HandlerKey, NodeKey, PrincipalId};
use cascade_flow::{ConcurrencyMode, DependencyGraph, FlowDocument, FlowError};
use cascade_handler::{CredentialResolver, HandlerRegistry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which validation rule a violation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    /// `node.type` is not registered.
    UnknownHandler,
    /// Two nodes share an id.
    DuplicateNode,
    /// An edge endpoint references a missing node.
    UnknownEdgeNode,
    /// More than one edge connects the same node pair.
    DuplicateEdge,
    /// The graph has a cycle.
    Cycle,
    /// No trigger-capable node with in-degree zero exists.
    TriggerMissing,
    /// More than one trigger-capable node has in-degree zero.
    MultipleTriggers,
    /// A non-trigger node has no inbound edge.
    UnreachableNode,
    /// No terminal (out-degree zero) node exists.
    NoTerminal,
    /// Node config failed the handler's schema.
    Config,
    /// A referenced credential is missing or not visible to the principal.
    Credential,
}

/// One validation failure, pointing at the offending node or edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanViolation {
    /// Which rule failed.
    pub code: ViolationCode,
    /// The offending node or edge id.
    pub subject: String,
    /// Human-readable description.
    pub message: String,
}

impl PlanViolation {
    fn new(code: ViolationCode, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// The full violation list for an invalid flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("flow validation failed with {} violation(s)", .violations.len())]
pub struct PlanError {
    /// Every violation found.
    pub violations: Vec<PlanViolation>,
}

/// One node of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// The handler that executes this node.
    pub handler: HandlerKey,
    /// The node's opaque config.
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Predecessors, sorted by key.
    pub predecessors: Vec<NodeKey>,
    /// Successors, sorted by key.
    pub successors: Vec<NodeKey>,
    /// Expected fan-in count.
    pub in_degree: usize,
    /// Per-node timeout from `config.timeoutSeconds`, if set.
    pub timeout_seconds: Option<u64>,
}

/// A validated, content-addressed execution schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// The flow this plan derives from.
    pub flow_id: FlowId,
    /// The flow document version.
    pub flow_version: semver::Version,
    /// SHA-256 of the canonical document JSON.
    pub flow_hash: String,
    /// Concurrency policy.
    pub concurrency: ConcurrencyMode,
    /// Execution-wide timeout in seconds.
    pub timeout_seconds: Option<u64>,
    /// Kahn order, ties broken by node key.
    pub topo_order: Vec<NodeKey>,
    /// Per-node planning data.
    pub nodes: BTreeMap<NodeKey, PlanNode>,
    /// The single start node.
    pub trigger: NodeKey,
    /// Nodes with no successors, sorted by key.
    pub terminals: Vec<NodeKey>,
}

impl ExecutionPlan {
    /// Look up a plan node.
    #[must_use]
    pub fn node(&self, key: &NodeKey) -> Option<&PlanNode> {
        self.nodes.get(key)
    }

    /// The topological index of a node, used for serialize-mode ordering.
    #[must_use]
    pub fn topo_index(&self, key: &NodeKey) -> Option<usize> {
        self.topo_order.iter().position(|k| k == key)
    }
}

/// Builds and validates execution plans.
pub struct PlanBuilder;

impl PlanBuilder {
    /// Validate `doc` against the registry and credential visibility, and
    /// derive the plan.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] listing every violation found.
    pub async fn build(
        flow_id: FlowId,
        doc: &FlowDocument,
        registry: &HandlerRegistry,
        credentials: &dyn CredentialResolver,
        principal: PrincipalId,
    ) -> Result<ExecutionPlan, PlanError> {
        let mut violations = Vec::new();

        // Rule 2a: node id uniqueness.
        let mut seen_ids: BTreeSet<&NodeKey> = BTreeSet::new();
        for node in &doc.definition.nodes {
            if !seen_ids.insert(&node.id) {
                violations.push(PlanViolation::new(
                    ViolationCode::DuplicateNode,
                    node.id.as_str(),
                    "node id is used more than once",
                ));
            }
        }

        // Rule 1: every handler type is registered.
        for node in &doc.definition.nodes {
            if !registry.contains(&node.handler) {
                violations.push(PlanViolation::new(
                    ViolationCode::UnknownHandler,
                    node.id.as_str(),
                    format!("unknown handler type `{}`", node.handler),
                ));
            }
        }

        // Rule 2b: edge endpoints exist. Rule 8: no duplicate edges.
        let node_ids: BTreeSet<&NodeKey> = doc.definition.nodes.iter().map(|n| &n.id).collect();
        let mut structural_ok = violations
            .iter()
            .all(|v| v.code != ViolationCode::DuplicateNode);
        let mut seen_edges: HashMap<(&NodeKey, &NodeKey), &str> = HashMap::new();
        for edge in &doc.definition.edges {
            let mut endpoints_ok = true;
            for endpoint in [&edge.source, &edge.target] {
                if !node_ids.contains(endpoint) {
                    violations.push(PlanViolation::new(
                        ViolationCode::UnknownEdgeNode,
                        edge.id.as_str(),
                        format!("edge references unknown node `{endpoint}`"),
                    ));
                    endpoints_ok = false;
                    structural_ok = false;
                }
            }
            if !endpoints_ok {
                continue;
            }
            if let Some(first) = seen_edges.insert((&edge.source, &edge.target), &edge.id) {
                violations.push(PlanViolation::new(
                    ViolationCode::DuplicateEdge,
                    edge.id.as_str(),
                    format!(
                        "duplicates edge `{first}` between `{}` and `{}`",
                        edge.source, edge.target
                    ),
                ));
                structural_ok = false;
            }
        }

        // Rule 6: config against each handler's schema.
        for node in &doc.definition.nodes {
            if let Some(handler) = registry.get(&node.handler) {
                for violation in handler.validate_config(&node.data.config) {
                    violations.push(PlanViolation::new(
                        ViolationCode::Config,
                        node.id.as_str(),
                        format!("{}: {}", violation.field, violation.message),
                    ));
                }
            }
        }

        // Rule 7: referenced credentials are visible to the principal.
        for node in &doc.definition.nodes {
            let Some(raw) = node
                .data
                .config
                .get("credentialId")
                .and_then(serde_json::Value::as_str)
            else {
                continue;
            };
            match cascade_core::CredentialId::parse(raw) {
                Err(_) => violations.push(PlanViolation::new(
                    ViolationCode::Credential,
                    node.id.as_str(),
                    format!("invalid credential id `{raw}`"),
                )),
                Ok(id) => match credentials.is_visible(principal, id).await {
                    Ok(true) => {}
                    Ok(false) => violations.push(PlanViolation::new(
                        ViolationCode::Credential,
                        node.id.as_str(),
                        format!("credential `{id}` is not visible to this principal"),
                    )),
                    Err(e) => violations.push(PlanViolation::new(
                        ViolationCode::Credential,
                        node.id.as_str(),
                        format!("credential store error: {e}"),
                    )),
                },
            }
        }

        // Graph-shaped rules need a structurally sound document.
        let mut graph_parts = None;
        if structural_ok {
            match DependencyGraph::from_document(doc) {
                Ok(graph) => match graph.topo_order() {
                    // Rule 3: acyclic.
                    Err(FlowError::Cycle(remaining)) => {
                        for node in remaining {
                            violations.push(PlanViolation::new(
                                ViolationCode::Cycle,
                                node.as_str(),
                                "node participates in a cycle",
                            ));
                        }
                    }
                    Err(other) => {
                        violations.push(PlanViolation::new(
                            ViolationCode::Cycle,
                            "",
                            other.to_string(),
                        ));
                    }
                    Ok(order) => graph_parts = Some((graph, order)),
                },
                // from_document failures were all reported above already;
                // this arm only fires if a rule drifted out of sync.
                Err(err) => {
                    violations.push(PlanViolation::new(
                        ViolationCode::UnknownEdgeNode,
                        "",
                        err.to_string(),
                    ));
                }
            }
        }

        let mut trigger = None;
        if let Some((graph, _)) = &graph_parts {
            // Rule 4: exactly one trigger-capable entry node.
            let entries = graph.entry_nodes();
            let mut trigger_entries = Vec::new();
            for entry in &entries {
                let is_trigger = doc
                    .node(entry)
                    .and_then(|n| registry.get(&n.handler))
                    .is_some_and(|h| h.metadata().is_trigger);
                if is_trigger {
                    trigger_entries.push(entry.clone());
                } else {
                    violations.push(PlanViolation::new(
                        ViolationCode::UnreachableNode,
                        entry.as_str(),
                        "node has no inbound edge and is not a trigger",
                    ));
                }
            }
            match trigger_entries.as_slice() {
                [] => violations.push(PlanViolation::new(
                    ViolationCode::TriggerMissing,
                    "",
                    "flow has no trigger node",
                )),
                [single] => trigger = Some(single.clone()),
                many => {
                    for entry in many {
                        violations.push(PlanViolation::new(
                            ViolationCode::MultipleTriggers,
                            entry.as_str(),
                            "flow has more than one trigger node",
                        ));
                    }
                }
            }

            // Rule 5: at least one terminal node.
            if graph.exit_nodes().is_empty() {
                violations.push(PlanViolation::new(
                    ViolationCode::NoTerminal,
                    "",
                    "flow has no terminal node",
                ));
            }
        }

        if !violations.is_empty() {
            return Err(PlanError { violations });
        }

        let (graph, topo_order) = graph_parts.expect("graph exists when no violations");
        let trigger = trigger.expect("trigger exists when no violations");

        let nodes = doc
            .definition
            .nodes
            .iter()
            .map(|node| {
                let plan_node = PlanNode {
                    handler: node.handler.clone(),
                    config: node.data.config.clone(),
                    predecessors: graph.predecessors(&node.id).to_vec(),
                    successors: graph.successors(&node.id).to_vec(),
                    in_degree: graph.in_degree(&node.id),
                    timeout_seconds: node
                        .data
                        .config
                        .get("timeoutSeconds")
                        .and_then(serde_json::Value::as_u64),
                };
                (node.id.clone(), plan_node)
            })
            .collect();

        Ok(ExecutionPlan {
            flow_id,
            flow_version: doc.version.clone(),
            flow_hash: content_hash(doc),
            concurrency: doc.settings.concurrency,
            timeout_seconds: doc.settings.timeout_seconds,
            topo_order,
            nodes,
            trigger,
            terminals: graph.exit_nodes(),
        })
    }
}

fn content_hash(doc: &FlowDocument) -> String {
    let canonical = doc.canonical_json().unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cascade_handler::{
        Handler, HandlerError, HandlerMetadata, HandlerOutput, MemoryCredentials, NodeContext,
        Schema,
    };
    use cascade_handler::{FieldDef, FieldKind};
    use cascade_flow::{EdgeSpec, FlowDefinition, FlowSettings, NodeSpec};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Stub {
        meta: HandlerMetadata,
    }

    #[async_trait]
    impl Handler for Stub {
        fn metadata(&self) -> &HandlerMetadata {
            &self.meta
        }

        async fn execute(&self, _ctx: NodeContext) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::empty())
        }
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Stub {
            meta: HandlerMetadata::new(
                HandlerKey::new("test.trigger").unwrap(),
                "Trigger",
                "start",
            )
            .trigger(),
        }));
        registry.register(Arc::new(Stub {
            meta: HandlerMetadata::new(HandlerKey::new("test.task").unwrap(), "Task", "work"),
        }));
        registry.register(Arc::new(Stub {
            meta: HandlerMetadata::new(
                HandlerKey::new("test.strict").unwrap(),
                "Strict",
                "validated",
            )
            .with_config_schema(Schema::with_fields(vec![
                FieldDef::new("target", "Target", FieldKind::String).required(),
            ])),
        }));
        registry
    }

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn handler(s: &str) -> HandlerKey {
        HandlerKey::new(s).unwrap()
    }

    fn doc(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> FlowDocument {
        FlowDocument {
            version: semver::Version::new(1, 0, 0),
            definition: FlowDefinition { nodes, edges },
            settings: FlowSettings::default(),
        }
    }

    fn diamond() -> FlowDocument {
        doc(
            vec![
                NodeSpec::new(key("trigger"), handler("test.trigger")),
                NodeSpec::new(key("a"), handler("test.task")),
                NodeSpec::new(key("b"), handler("test.task")),
                NodeSpec::new(key("end"), handler("test.task")),
            ],
            vec![
                EdgeSpec::new("e1", key("trigger"), key("a")),
                EdgeSpec::new("e2", key("trigger"), key("b")),
                EdgeSpec::new("e3", key("a"), key("end")),
                EdgeSpec::new("e4", key("b"), key("end")),
            ],
        )
    }

    async fn build(doc: &FlowDocument) -> Result<ExecutionPlan, PlanError> {
        PlanBuilder::build(
            FlowId::v4(),
            doc,
            &registry(),
            &MemoryCredentials::new(),
            PrincipalId::v4(),
        )
        .await
    }

    fn codes(err: &PlanError) -> Vec<ViolationCode> {
        err.violations.iter().map(|v| v.code).collect()
    }

    #[tokio::test]
    async fn valid_diamond_plans() {
        let plan = build(&diamond()).await.unwrap();

        assert_eq!(plan.trigger, key("trigger"));
        assert_eq!(plan.terminals, vec![key("end")]);
        assert_eq!(
            plan.topo_order,
            vec![key("trigger"), key("a"), key("b"), key("end")]
        );
        assert_eq!(plan.nodes[&key("end")].in_degree, 2);
        assert_eq!(
            plan.nodes[&key("trigger")].successors,
            vec![key("a"), key("b")]
        );
        assert_eq!(plan.flow_hash.len(), 64);
    }

    #[tokio::test]
    async fn unknown_handler_reported() {
        let mut d = diamond();
        d.definition.nodes[1].handler = handler("test.ghost");
        let err = build(&d).await.unwrap_err();
        assert!(codes(&err).contains(&ViolationCode::UnknownHandler));
        assert_eq!(err.violations[0].subject, "a");
    }

    #[tokio::test]
    async fn cycle_reported_with_nodes() {
        let d = doc(
            vec![
                NodeSpec::new(key("trigger"), handler("test.trigger")),
                NodeSpec::new(key("a"), handler("test.task")),
                NodeSpec::new(key("b"), handler("test.task")),
            ],
            vec![
                EdgeSpec::new("e1", key("trigger"), key("a")),
                EdgeSpec::new("e2", key("a"), key("b")),
                EdgeSpec::new("e3", key("b"), key("a")),
            ],
        );
        let err = build(&d).await.unwrap_err();
        let cycle_subjects: Vec<&str> = err
            .violations
            .iter()
            .filter(|v| v.code == ViolationCode::Cycle)
            .map(|v| v.subject.as_str())
            .collect();
        assert_eq!(cycle_subjects, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn non_trigger_entry_node_reported() {
        let mut d = diamond();
        // "orphan" has no inbound edge and is not a trigger.
        d.definition
            .nodes
            .push(NodeSpec::new(key("orphan"), handler("test.task")));
        d.definition
            .edges
            .push(EdgeSpec::new("e5", key("orphan"), key("end")));
        let err = build(&d).await.unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::UnreachableNode]);
        assert_eq!(err.violations[0].subject, "orphan");
    }

    #[tokio::test]
    async fn missing_trigger_reported() {
        let d = doc(
            vec![
                NodeSpec::new(key("a"), handler("test.task")),
                NodeSpec::new(key("b"), handler("test.task")),
            ],
            vec![EdgeSpec::new("e1", key("a"), key("b"))],
        );
        let err = build(&d).await.unwrap_err();
        assert!(codes(&err).contains(&ViolationCode::TriggerMissing));
    }

    #[tokio::test]
    async fn multiple_triggers_reported() {
        let mut d = diamond();
        d.definition
            .nodes
            .push(NodeSpec::new(key("trigger2"), handler("test.trigger")));
        d.definition
            .edges
            .push(EdgeSpec::new("e5", key("trigger2"), key("a")));
        let err = build(&d).await.unwrap_err();
        let subjects: Vec<&str> = err
            .violations
            .iter()
            .filter(|v| v.code == ViolationCode::MultipleTriggers)
            .map(|v| v.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["trigger", "trigger2"]);
    }

    #[tokio::test]
    async fn duplicate_edge_reported() {
        let mut d = diamond();
        d.definition
            .edges
            .push(EdgeSpec::new("e5", key("a"), key("end")));
        let err = build(&d).await.unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::DuplicateEdge]);
        assert_eq!(err.violations[0].subject, "e5");
    }

    #[tokio::test]
    async fn config_schema_violations_reported() {
        let mut d = diamond();
        d.definition.nodes[1] = NodeSpec::new(key("a"), handler("test.strict"));
        let err = build(&d).await.unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::Config]);
        assert!(err.violations[0].message.contains("target"));
    }

    #[tokio::test]
    async fn credential_visibility_checked() {
        let store = MemoryCredentials::new();
        let principal = PrincipalId::v4();
        let visible = cascade_core::CredentialId::v4();
        store.insert(
            principal,
            visible,
            cascade_handler::CredentialPayload::default(),
        );

        let mut d = diamond();
        let mut config = serde_json::Map::new();
        config.insert(
            "credentialId".into(),
            serde_json::Value::String(visible.to_string()),
        );
        d.definition.nodes[1] = NodeSpec::new(key("a"), handler("test.task")).with_config(config);

        // Visible credential: plan succeeds.
        let plan = PlanBuilder::build(FlowId::v4(), &d, &registry(), &store, principal).await;
        assert!(plan.is_ok());

        // Unknown credential: plan fails before execution.
        let mut config = serde_json::Map::new();
        config.insert(
            "credentialId".into(),
            serde_json::Value::String(cascade_core::CredentialId::v4().to_string()),
        );
        d.definition.nodes[1] = NodeSpec::new(key("a"), handler("test.task")).with_config(config);
        let err = PlanBuilder::build(FlowId::v4(), &d, &registry(), &store, principal)
            .await
            .unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::Credential]);
    }

    #[tokio::test]
    async fn all_violations_collected_together() {
        let mut d = diamond();
        d.definition.nodes[1].handler = handler("test.ghost");
        d.definition
            .edges
            .push(EdgeSpec::new("e5", key("b"), key("missing")));
        let err = build(&d).await.unwrap_err();
        let found = codes(&err);
        assert!(found.contains(&ViolationCode::UnknownHandler));
        assert!(found.contains(&ViolationCode::UnknownEdgeNode));
        assert!(err.violations.len() >= 2);
    }

    #[tokio::test]
    async fn per_node_timeout_captured() {
        let mut d = diamond();
        let mut config = serde_json::Map::new();
        config.insert("timeoutSeconds".into(), serde_json::json!(12));
        d.definition.nodes[1] = NodeSpec::new(key("a"), handler("test.task")).with_config(config);

        let plan = build(&d).await.unwrap();
        assert_eq!(plan.nodes[&key("a")].timeout_seconds, Some(12));
        assert_eq!(plan.nodes[&key("b")].timeout_seconds, None);
    }

    #[tokio::test]
    async fn content_hash_tracks_document() {
        let plan_a = build(&diamond()).await.unwrap();
        let plan_b = build(&diamond()).await.unwrap();
        assert_eq!(plan_a.flow_hash, plan_b.flow_hash);

        let mut changed = diamond();
        changed.settings.timeout_seconds = Some(99);
        let plan_c = build(&changed).await.unwrap();
        assert_ne!(plan_a.flow_hash, plan_c.flow_hash);
    }

    #[tokio::test]
    async fn plan_serde_roundtrip() {
        let plan = build(&diamond()).await.unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: ExecutionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
    }
}
