//! Dependency graph derived from a flow document.
//!
//! Wraps a petgraph `DiGraph` with the lookups the plan builder and
//! scheduler need: sorted adjacency, in-degrees, deterministic Kahn
//! ordering, and forward reachability for failure pruning.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cascade_core::NodeKey;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::document::FlowDocument;
use crate::error::FlowError;

/// Adjacency view of a flow's nodes and edges.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeKey, ()>,
    indices: HashMap<NodeKey, NodeIndex>,
    /// Successor lists, sorted by node key.
    successors: BTreeMap<NodeKey, Vec<NodeKey>>,
    /// Predecessor lists, sorted by node key.
    predecessors: BTreeMap<NodeKey, Vec<NodeKey>>,
}

impl DependencyGraph {
    /// Build the graph from a document.
    ///
    /// Rejects duplicate node ids, edges whose endpoints do not exist, and
    /// more than one edge between the same (source, target) pair. Cycles
    /// are not checked here; call [`topo_order`](Self::topo_order).
    pub fn from_document(doc: &FlowDocument) -> Result<Self, FlowError> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();

        for node in &doc.definition.nodes {
            if indices.contains_key(&node.id) {
                return Err(FlowError::DuplicateNode(node.id.clone()));
            }
            let idx = graph.add_node(node.id.clone());
            indices.insert(node.id.clone(), idx);
        }

        let mut seen_pairs = BTreeSet::new();
        let mut successors: BTreeMap<NodeKey, Vec<NodeKey>> = BTreeMap::new();
        let mut predecessors: BTreeMap<NodeKey, Vec<NodeKey>> = BTreeMap::new();
        for key in indices.keys() {
            successors.insert(key.clone(), Vec::new());
            predecessors.insert(key.clone(), Vec::new());
        }

        for edge in &doc.definition.edges {
            let source = indices.get(&edge.source).ok_or_else(|| FlowError::UnknownNode {
                edge_id: edge.id.clone(),
                node: edge.source.clone(),
            })?;
            let target = indices.get(&edge.target).ok_or_else(|| FlowError::UnknownNode {
                edge_id: edge.id.clone(),
                node: edge.target.clone(),
            })?;
            if !seen_pairs.insert((edge.source.clone(), edge.target.clone())) {
                return Err(FlowError::DuplicateEdge {
                    source_node: edge.source.clone(),
                    target: edge.target.clone(),
                });
            }
            graph.add_edge(*source, *target, ());
            successors
                .get_mut(&edge.source)
                .expect("source checked above")
                .push(edge.target.clone());
            predecessors
                .get_mut(&edge.target)
                .expect("target checked above")
                .push(edge.source.clone());
        }

        for list in successors.values_mut() {
            list.sort();
        }
        for list in predecessors.values_mut() {
            list.sort();
        }

        Ok(Self {
            graph,
            indices,
            successors,
            predecessors,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the node exists.
    #[must_use]
    pub fn contains(&self, node: &NodeKey) -> bool {
        self.indices.contains_key(node)
    }

    /// Successors of a node, sorted by key.
    #[must_use]
    pub fn successors(&self, node: &NodeKey) -> &[NodeKey] {
        self.successors.get(node).map_or(&[], Vec::as_slice)
    }

    /// Predecessors of a node, sorted by key.
    #[must_use]
    pub fn predecessors(&self, node: &NodeKey) -> &[NodeKey] {
        self.predecessors.get(node).map_or(&[], Vec::as_slice)
    }

    /// Number of inbound edges.
    #[must_use]
    pub fn in_degree(&self, node: &NodeKey) -> usize {
        self.predecessors(node).len()
    }

    /// Number of outbound edges.
    #[must_use]
    pub fn out_degree(&self, node: &NodeKey) -> usize {
        self.successors(node).len()
    }

    /// Nodes with no inbound edges, sorted by key.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeKey> {
        self.predecessors
            .iter()
            .filter(|(_, preds)| preds.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Nodes with no outbound edges, sorted by key.
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<NodeKey> {
        self.successors
            .iter()
            .filter(|(_, succs)| succs.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Kahn topological order, breaking ties lexicographically by node key.
    ///
    /// On a cycle, returns the nodes still holding nonzero in-degree when
    /// the frontier drained.
    pub fn topo_order(&self) -> Result<Vec<NodeKey>, FlowError> {
        let mut remaining: BTreeMap<NodeKey, usize> = self
            .predecessors
            .iter()
            .map(|(key, preds)| (key.clone(), preds.len()))
            .collect();

        // BTreeSet frontier gives the deterministic lexicographic tie-break.
        let mut frontier: BTreeSet<NodeKey> = remaining
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(key, _)| key.clone())
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while let Some(node) = frontier.pop_first() {
            remaining.remove(&node);
            for succ in self.successors(&node) {
                let degree = remaining
                    .get_mut(succ)
                    .expect("successor of an unprocessed node is unprocessed");
                *degree -= 1;
                if *degree == 0 {
                    frontier.insert(succ.clone());
                }
            }
            order.push(node);
        }

        if remaining.is_empty() {
            Ok(order)
        } else {
            Err(FlowError::Cycle(remaining.into_keys().collect()))
        }
    }

    /// All nodes reachable from `start` by following edges forward,
    /// excluding `start` itself. Used for failure pruning.
    #[must_use]
    pub fn descendants(&self, start: &NodeKey) -> BTreeSet<NodeKey> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeKey> = self.successors(start).to_vec();
        while let Some(node) = stack.pop() {
            if seen.insert(node.clone()) {
                stack.extend(self.successors(&node).iter().cloned());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{EdgeSpec, FlowDefinition, FlowDocument, FlowSettings, NodeSpec};
    use cascade_core::HandlerKey;
    use pretty_assertions::assert_eq;

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn doc(node_ids: &[&str], edges: &[(&str, &str)]) -> FlowDocument {
        let handler = HandlerKey::new("test.noop").unwrap();
        FlowDocument {
            version: semver::Version::new(0, 1, 0),
            definition: FlowDefinition {
                nodes: node_ids
                    .iter()
                    .map(|id| NodeSpec::new(key(id), handler.clone()))
                    .collect(),
                edges: edges
                    .iter()
                    .enumerate()
                    .map(|(i, (s, t))| EdgeSpec::new(format!("e{i}"), key(s), key(t)))
                    .collect(),
            },
            settings: FlowSettings::default(),
        }
    }

    #[test]
    fn linear_chain() {
        let g = DependencyGraph::from_document(&doc(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c")],
        ))
        .unwrap();

        assert_eq!(g.node_count(), 3);
        assert_eq!(g.entry_nodes(), vec![key("a")]);
        assert_eq!(g.exit_nodes(), vec![key("c")]);
        assert_eq!(g.topo_order().unwrap(), vec![key("a"), key("b"), key("c")]);
    }

    #[test]
    fn diamond_in_degrees() {
        let g = DependencyGraph::from_document(&doc(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        ))
        .unwrap();

        assert_eq!(g.in_degree(&key("a")), 0);
        assert_eq!(g.in_degree(&key("d")), 2);
        assert_eq!(g.predecessors(&key("d")), &[key("b"), key("c")]);
        assert_eq!(g.successors(&key("a")), &[key("b"), key("c")]);
    }

    #[test]
    fn topo_order_breaks_ties_lexicographically() {
        // b2 and b1 are both ready after a; b1 must come first.
        let g = DependencyGraph::from_document(&doc(
            &["a", "b2", "b1", "z"],
            &[("a", "b2"), ("a", "b1"), ("b1", "z"), ("b2", "z")],
        ))
        .unwrap();

        assert_eq!(
            g.topo_order().unwrap(),
            vec![key("a"), key("b1"), key("b2"), key("z")]
        );
    }

    #[test]
    fn cycle_reports_remaining_nodes() {
        let err = DependencyGraph::from_document(&doc(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c"), ("c", "b")],
        ))
        .unwrap()
        .topo_order()
        .unwrap_err();

        assert_eq!(err, FlowError::Cycle(vec![key("b"), key("c")]));
    }

    #[test]
    fn unknown_edge_endpoint_rejected() {
        let err = DependencyGraph::from_document(&doc(&["a"], &[("a", "ghost")])).unwrap_err();
        assert_eq!(
            err,
            FlowError::UnknownNode {
                edge_id: "e0".into(),
                node: key("ghost"),
            }
        );
    }

    #[test]
    fn duplicate_node_rejected() {
        let err = DependencyGraph::from_document(&doc(&["a", "a"], &[])).unwrap_err();
        assert_eq!(err, FlowError::DuplicateNode(key("a")));
    }

    #[test]
    fn duplicate_edge_pair_rejected() {
        let err = DependencyGraph::from_document(&doc(
            &["a", "b"],
            &[("a", "b"), ("a", "b")],
        ))
        .unwrap_err();
        assert_eq!(
            err,
            FlowError::DuplicateEdge {
                source_node: key("a"),
                target: key("b"),
            }
        );
    }

    #[test]
    fn descendants_is_forward_closure() {
        let g = DependencyGraph::from_document(&doc(
            &["t", "gen", "a", "b", "agg", "end"],
            &[
                ("t", "gen"),
                ("gen", "a"),
                ("gen", "b"),
                ("a", "agg"),
                ("b", "agg"),
                ("agg", "end"),
            ],
        ))
        .unwrap();

        let desc = g.descendants(&key("b"));
        assert_eq!(desc, BTreeSet::from([key("agg"), key("end")]));
        assert!(g.descendants(&key("end")).is_empty());
    }

    #[test]
    fn isolated_node_is_entry_and_exit() {
        let g = DependencyGraph::from_document(&doc(&["solo"], &[])).unwrap();
        assert_eq!(g.entry_nodes(), vec![key("solo")]);
        assert_eq!(g.exit_nodes(), vec![key("solo")]);
        assert_eq!(g.topo_order().unwrap(), vec![key("solo")]);
    }
}
