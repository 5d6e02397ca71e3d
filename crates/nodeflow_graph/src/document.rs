// SPDX-License-Identifier: MIT OR Apache-2.0
//! Portable graph documents for import/export.
//!
//! A [`GraphDocument`] lists every node with its signature, UI inputs and
//! position, and every edge with its endpoint anchors. Node and edge IDs are
//! preserved across a round trip; the imported graph gets a fresh graph ID.

use crate::anchor::AnchorId;
use crate::edge::EdgeId;
use crate::graph::{Graph, GraphError};
use crate::node::{Node, NodeId};
use crate::operation::{OperationRegistry, UiInputs};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Current document format version
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// Encoding of a graph document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Format {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// Pretty-printed RON
    Ron,
}

impl FromStr for Format {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "ron" => Ok(Self::Ron),
            other => Err(DocumentError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Ron => f.write_str("ron"),
        }
    }
}

/// Serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node ID
    pub id: NodeId,
    /// Operation signature
    pub signature: String,
    /// UI-input values
    pub ui_inputs: UiInputs,
    /// Position in the graph UI
    pub position: [f32; 2],
}

/// Serialized edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Edge ID
    pub id: EdgeId,
    /// Source anchor
    pub from: AnchorId,
    /// Target anchor
    pub to: AnchorId,
}

/// Portable representation of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Format version
    pub version: u32,
    /// Graph name
    pub name: String,
    /// Nodes in graph order
    pub nodes: Vec<NodeRecord>,
    /// Edges in creation order
    pub edges: Vec<EdgeRecord>,
}

impl GraphDocument {
    /// Capture a graph
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            version: DOCUMENT_FORMAT_VERSION,
            name: graph.name.clone(),
            nodes: graph
                .nodes()
                .map(|node| NodeRecord {
                    id: node.id,
                    signature: node.signature.clone(),
                    ui_inputs: node.ui_inputs().clone(),
                    position: node.position,
                })
                .collect(),
            edges: graph
                .edges()
                .map(|edge| EdgeRecord {
                    id: edge.id,
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph, re-instantiating each node from the registry
    pub fn into_graph(self, operations: &OperationRegistry) -> Result<Graph, DocumentError> {
        if self.version != DOCUMENT_FORMAT_VERSION {
            return Err(DocumentError::MalformedData(format!(
                "unsupported document version {}",
                self.version
            )));
        }

        let mut graph = Graph::new(self.name);
        let mut seen = HashSet::new();
        for record in self.nodes {
            if !seen.insert(record.id) {
                return Err(DocumentError::MalformedData(format!("duplicate node id {}", record.id)));
            }
            let def = operations
                .get(&record.signature)
                .ok_or_else(|| DocumentError::UnknownSignature(record.signature.clone()))?;

            let mut node = Node::with_id(record.id, def).with_position(record.position[0], record.position[1]);
            node.ui_inputs.extend(record.ui_inputs);
            graph.insert_node(node);
        }

        for record in self.edges {
            graph
                .insert_edge(record.id, &record.from, &record.to)
                .map_err(|e| match e {
                    GraphError::InvalidAnchor(anchor) => {
                        DocumentError::MalformedData(format!("edge {} references missing anchor {anchor}", record.id))
                    }
                    other => DocumentError::MalformedData(format!("edge {} rejected: {other}", record.id)),
                })?;
        }

        Ok(graph)
    }
}

/// Export a graph in the given format
pub fn export(graph: &Graph, format: Format) -> Result<String, DocumentError> {
    let document = GraphDocument::from_graph(graph);
    let text = match format {
        Format::Json => serde_json::to_string_pretty(&document)?,
        Format::Ron => ron::ser::to_string_pretty(&document, ron::ser::PrettyConfig::default())?,
    };
    tracing::debug!("Exported graph {} as {format}", graph.id);
    Ok(text)
}

/// Import a graph from text in the given format
pub fn import(format: Format, data: &str, operations: &OperationRegistry) -> Result<Graph, DocumentError> {
    let document: GraphDocument = match format {
        Format::Json => serde_json::from_str(data)?,
        Format::Ron => ron::from_str(data)?,
    };
    let graph = document.into_graph(operations)?;
    tracing::info!(
        "Imported graph {} ({} nodes, {} edges)",
        graph.id,
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Error while importing or exporting a graph document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Referenced operation is no longer registered
    #[error("Unknown node signature: {0}")]
    UnknownSignature(String),

    /// Document violates graph invariants
    #[error("Malformed graph data: {0}")]
    MalformedData(String),

    /// Unknown format name
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// RON serialization error
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{create_builtin_registry, ADD, NUMBER, OUTPUT, OUTPUT_ID_KEY};
    use crate::graph::UiInputsUpdate;
    use crate::value::Value;

    fn sample(registry: &OperationRegistry) -> Graph {
        let mut graph = Graph::new("Sample");
        let a = graph.add_node(registry.get(NUMBER).unwrap());
        let b = graph.add_node(registry.get(NUMBER).unwrap());
        let sum = graph.add_node(registry.get(ADD).unwrap());
        let out = graph.add_node(registry.get(OUTPUT).unwrap());
        graph.add_edge(&a.output_anchors[0], &sum.input_anchors[0]).unwrap();
        graph.add_edge(&b.output_anchors[0], &sum.input_anchors[1]).unwrap();
        graph.add_edge(&sum.output_anchors[0], &out.input_anchors[0]).unwrap();
        graph
            .update_ui_inputs(a.node_id, UiInputsUpdate::single("value", Value::Float(3.0)))
            .unwrap();
        graph
            .update_ui_inputs(out.node_id, UiInputsUpdate::single(OUTPUT_ID_KEY, Value::from("preview")))
            .unwrap();
        graph.set_node_pos(sum.node_id, 120.0, 40.0).unwrap();
        graph
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let registry = create_builtin_registry();
        let graph = sample(&registry);

        for format in [Format::Json, Format::Ron] {
            let text = export(&graph, format).unwrap();
            let imported = import(format, &text, &registry).unwrap();

            assert_ne!(imported.id, graph.id);
            assert_eq!(GraphDocument::from_graph(&imported), GraphDocument::from_graph(&graph));
        }
    }

    #[test]
    fn test_unknown_signature() {
        let registry = create_builtin_registry();
        let mut document = GraphDocument::from_graph(&sample(&registry));
        document.nodes[0].signature = "plugin.gone".to_string();

        let err = document.into_graph(&registry).unwrap_err();
        assert!(matches!(err, DocumentError::UnknownSignature(s) if s == "plugin.gone"));
    }

    #[test]
    fn test_dangling_anchor_is_malformed() {
        let registry = create_builtin_registry();
        let mut document = GraphDocument::from_graph(&sample(&registry));
        document.edges[0].to.node = NodeId::new();

        assert!(matches!(document.into_graph(&registry), Err(DocumentError::MalformedData(_))));
    }

    #[test]
    fn test_duplicate_ids_are_malformed() {
        let registry = create_builtin_registry();
        let mut document = GraphDocument::from_graph(&sample(&registry));
        let duplicate = document.nodes[0].clone();
        document.nodes.push(duplicate);
        assert!(matches!(document.into_graph(&registry), Err(DocumentError::MalformedData(_))));

        let mut document = GraphDocument::from_graph(&sample(&registry));
        let duplicate = document.edges[0].clone();
        document.edges.push(duplicate);
        assert!(matches!(document.into_graph(&registry), Err(DocumentError::MalformedData(_))));
    }

    #[test]
    fn test_duplicate_edge_id_to_free_input_is_malformed() {
        let registry = create_builtin_registry();
        let mut graph = sample(&registry);
        let spare = graph.add_node(registry.get(ADD).unwrap());
        let mut document = GraphDocument::from_graph(&graph);

        let mut duplicate = document.edges[0].clone();
        duplicate.to = spare.input_anchors[0].clone();
        let edge_id = duplicate.id;
        document.edges.push(duplicate);

        match document.into_graph(&registry) {
            Err(DocumentError::MalformedData(message)) => {
                assert!(message.contains(&format!("duplicate edge id {edge_id}")), "{message}");
            }
            other => panic!("expected malformed data, got {other:?}"),
        }
    }

    #[test]
    fn test_format_names() {
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("ron".parse::<Format>().unwrap(), Format::Ron);
        assert!(matches!("xml".parse::<Format>(), Err(DocumentError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let registry = create_builtin_registry();
        assert!(matches!(import(Format::Json, "{ nope", &registry), Err(DocumentError::Json(_))));
    }
}
