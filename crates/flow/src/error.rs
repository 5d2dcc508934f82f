//! Flow-level errors.

use cascade_core::NodeKey;

/// Errors from parsing a flow document or deriving its graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    /// The document JSON could not be parsed.
    #[error("flow document parse failed: {0}")]
    Parse(String),

    /// An edge referenced a node id that does not exist in the document.
    #[error("edge {edge_id} references unknown node {node}")]
    UnknownNode {
        /// Id of the offending edge.
        edge_id: String,
        /// The missing node id.
        node: NodeKey,
    },

    /// Two nodes share the same id.
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeKey),

    /// More than one edge connects the same (source, target) pair.
    #[error("duplicate edge between {source_node} and {target}")]
    DuplicateEdge {
        /// Source node id.
        source_node: NodeKey,
        /// Target node id.
        target: NodeKey,
    },

    /// The graph contains a cycle; the listed nodes never reached
    /// in-degree zero during Kahn's algorithm.
    #[error("graph contains a cycle through {0:?}")]
    Cycle(Vec<NodeKey>),
}
