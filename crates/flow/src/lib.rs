#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Flow
//!
//! The declarative flow document (the JSON artifact users publish from the
//! editor) and the dependency graph derived from it.
//!
//! A [`FlowDocument`] is immutable once published: `version`, a `definition`
//! holding nodes and edges, and execution `settings`. The engine never
//! executes a document directly; the plan builder (in `cascade-execution`)
//! validates it and derives an execution plan, using [`DependencyGraph`] for
//! adjacency, in-degrees, and Kahn topological ordering.

pub mod document;
pub mod error;
pub mod graph;

pub use document::{
    ConcurrencyMode, EdgeSpec, FlowDefinition, FlowDocument, FlowSettings, NodeData, NodeSpec,
};
pub use error::FlowError;
pub use graph::DependencyGraph;
