// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph core for Nodeflow.
//!
//! This crate provides the data side of the graph runtime:
//! - The graph store: nodes, typed anchors and edges, kept acyclic
//! - The operation registry nodes are instantiated from
//! - The interpreter that evaluates a graph in dependency order
//! - Import/export of portable graph documents
//!
//! ## Architecture
//!
//! A [`Graph`] never evaluates anything itself. Nodes carry a signature that
//! is resolved against an [`OperationRegistry`] by the [`Interpreter`], which
//! writes results back into each node's output cache.

pub mod anchor;
pub mod builtins;
pub mod document;
pub mod edge;
pub mod evaluation;
pub mod graph;
pub mod node;
pub mod operation;
pub mod value;

pub use anchor::{Anchor, AnchorDirection, AnchorId, AnchorType};
pub use document::{DocumentError, Format, GraphDocument};
pub use edge::{Edge, EdgeId, EdgeRef};
pub use evaluation::{
    EvaluationError, EvaluationScope, InterpretationReport, Interpreter, SinkValue, UnresolvedSink,
};
pub use graph::{AddedNode, Graph, GraphError, GraphId, UiInputsChanged, UiInputsUpdate};
pub use node::{Node, NodeId, NodeStatus};
pub use operation::{
    Operation, OperationCategory, OperationDef, OperationError, OperationRegistry, UiComponent,
    UiComponentKind,
};
pub use value::Value;
