//! Property tests over generated DAGs: every observed schedule is a valid
//! topological order, fan-in snapshots are exactly the predecessor map, and
//! node time never exceeds the wall-clock budget times the parallelism cap.

use std::collections::BTreeMap;
use std::sync::Arc;

use cascade_core::{FlowId, HandlerKey, NodeKey, PrincipalId};
use cascade_engine::{Engine, EngineConfig, ExecutionRequest, MemoryFlowStore};
use cascade_execution::{ExecutionStatus, NodeStatus};
use cascade_flow::{EdgeSpec, FlowDefinition, FlowDocument, FlowSettings, NodeSpec};
use cascade_value::Value;
use proptest::prelude::*;
use rstest::rstest;

fn key(s: &str) -> NodeKey {
    NodeKey::new(s).unwrap()
}

fn handler(s: &str) -> HandlerKey {
    HandlerKey::new(s).unwrap()
}

/// Build a random-but-valid flow: node 0 is the trigger; every later node
/// draws at least one edge from an earlier node, which guarantees a single
/// entry and an acyclic graph.
fn random_flow(extra_edges: &[(usize, usize)], node_count: usize) -> FlowDocument {
    let mut nodes = vec![NodeSpec::new(key("n000"), handler("core.manual_trigger"))];
    for i in 1..node_count {
        let mut config = serde_json::Map::new();
        config.insert(
            "fields".into(),
            serde_json::json!({ "idx": i }),
        );
        nodes.push(
            NodeSpec::new(key(&format!("n{i:03}")), handler("core.set")).with_config(config),
        );
    }

    let mut pairs: Vec<(usize, usize)> = (1..node_count).map(|i| (i - 1, i)).collect();
    for &(a, b) in extra_edges {
        let (a, b) = (a % node_count, b % node_count);
        // Forward edges only, so the graph stays acyclic.
        let (a, b) = (a.min(b), a.max(b));
        if a != b && !pairs.contains(&(a, b)) {
            pairs.push((a, b));
        }
    }

    FlowDocument {
        version: semver::Version::new(1, 0, 0),
        definition: FlowDefinition {
            nodes,
            edges: pairs
                .iter()
                .enumerate()
                .map(|(i, (a, b))| {
                    EdgeSpec::new(
                        format!("e{i}"),
                        key(&format!("n{a:03}")),
                        key(&format!("n{b:03}")),
                    )
                })
                .collect(),
        },
        settings: FlowSettings::default(),
    }
}

fn run_flow(doc: FlowDocument) -> (cascade_execution::ExecutionRecord, Vec<cascade_execution::NodeExecutionRecord>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async move {
        let flows = Arc::new(MemoryFlowStore::new());
        let flow_store: Arc<dyn cascade_engine::FlowStore> = flows.clone();
        let engine = Engine::builder()
            .with_core_handlers()
            .with_flow_store(flow_store)
            .build();
        let flow_id = FlowId::v4();
        flows.publish(flow_id, doc);

        let record = engine
            .run_to_completion(ExecutionRequest::new(
                flow_id,
                semver::Version::new(1, 0, 0),
                Value::empty_object(),
                PrincipalId::v4(),
            ))
            .await
            .unwrap();
        let rows = engine.journal().node_executions(record.id).await.unwrap();
        (record, rows)
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 16,
        ..ProptestConfig::default()
    })]

    /// Invariants 1, 2, and 7: the journal shows a valid topological
    /// schedule, the run terminates, and total node time is bounded by
    /// wall-clock times the parallelism cap.
    #[test]
    fn observed_schedule_is_topological(
        node_count in 3usize..9,
        extra_edges in prop::collection::vec((0usize..9, 0usize..9), 0..6),
    ) {
        let doc = random_flow(&extra_edges, node_count);
        let edges: Vec<(NodeKey, NodeKey)> = doc
            .definition
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();

        let (record, rows) = run_flow(doc);
        prop_assert_eq!(record.status, ExecutionStatus::Completed);

        let by_node: BTreeMap<NodeKey, &cascade_execution::NodeExecutionRecord> =
            rows.iter().map(|r| (r.node_id.clone(), r)).collect();

        // Every node terminal, every successor started after every
        // predecessor ended.
        for row in &rows {
            prop_assert_eq!(row.status, NodeStatus::Succeeded);
        }
        for (source, target) in &edges {
            let pred_ended = by_node[source].ended_at.unwrap();
            let succ_started = by_node[target].started_at.unwrap();
            prop_assert!(
                succ_started >= pred_ended,
                "{target} started before {source} ended"
            );
        }

        // Node time bounded by wall time × parallelism (plus timestamp
        // granularity slack).
        let total_node_ms: u64 = rows.iter().filter_map(|r| r.duration_ms).sum();
        let wall_ms = record.duration_ms().unwrap();
        let cap = EngineConfig::default().max_parallel as u64;
        prop_assert!(total_node_ms <= (wall_ms + 10) * cap);
    }
}

/// Invariant 3: a fan-in of k yields a snapshot with exactly the k
/// predecessor entries.
#[rstest]
#[case(2)]
#[case(3)]
#[case(5)]
fn fan_in_snapshot_has_exactly_k_entries(#[case] k: usize) {
    let mut nodes = vec![NodeSpec::new(key("trigger"), handler("core.manual_trigger"))];
    let mut edges = Vec::new();
    for i in 0..k {
        let id = format!("branch{i}");
        let mut config = serde_json::Map::new();
        config.insert("fields".into(), serde_json::json!({ "i": i }));
        nodes.push(NodeSpec::new(key(&id), handler("core.set")).with_config(config));
        edges.push(EdgeSpec::new(format!("in{i}"), key("trigger"), key(&id)));
        edges.push(EdgeSpec::new(format!("out{i}"), key(&id), key("join")));
    }
    nodes.push(NodeSpec::new(key("join"), handler("core.merge")));

    let doc = FlowDocument {
        version: semver::Version::new(1, 0, 0),
        definition: FlowDefinition { nodes, edges },
        settings: FlowSettings::default(),
    };

    let (record, rows) = run_flow(doc);
    assert_eq!(record.status, ExecutionStatus::Completed);

    let join = rows.iter().find(|r| r.node_id.as_str() == "join").unwrap();
    let snapshot = join.input_snapshot.clone().unwrap();
    let map = snapshot.as_object().unwrap().clone();
    assert_eq!(map.len(), k);
    for i in 0..k {
        let entry = &map[&format!("branch{i}")];
        assert_eq!(
            entry,
            &Value::from_json(serde_json::json!({"i": i}))
        );
    }
}
