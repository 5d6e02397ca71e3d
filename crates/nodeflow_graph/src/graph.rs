// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and edges.
//!
//! The graph is a DAG by construction: every mutation that could break an
//! invariant is validated first and rejected without touching the edge set.

use crate::anchor::{Anchor, AnchorDirection, AnchorId, AnchorType};
use crate::edge::{Edge, EdgeId, EdgeRef};
use crate::node::{Node, NodeId};
use crate::operation::OperationDef;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Create a new random graph ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Anchors registered for a freshly added node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedNode {
    /// New node ID
    pub node_id: NodeId,
    /// Input anchors in declaration order
    pub input_anchors: Vec<AnchorId>,
    /// Output anchors in declaration order
    pub output_anchors: Vec<AnchorId>,
}

/// A UI-input update sent by the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiInputsUpdate {
    /// Keys the user changed
    pub changes: Vec<String>,
    /// New values; merged into the node's UI-input map
    pub inputs: IndexMap<String, Value>,
}

impl UiInputsUpdate {
    /// Build an update that changes a single key
    pub fn single(key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        let mut inputs = IndexMap::new();
        inputs.insert(key.clone(), value);
        Self {
            changes: vec![key],
            inputs,
        }
    }
}

/// Outcome of a UI-input update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiInputsChanged {
    /// Node that was updated
    pub node_id: NodeId,
    /// Keys recorded as changed
    pub changed: Vec<String>,
}

/// A node graph
#[derive(Debug, Clone)]
pub struct Graph {
    /// Graph ID
    pub id: GraphId,
    /// Graph name
    pub name: String,
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
    revision: u64,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(GraphId::new(), name)
    }

    /// Create a new empty graph with a known ID
    pub fn with_id(id: GraphId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            revision: 0,
        }
    }

    /// Instantiate a node from an operation definition
    pub fn add_node(&mut self, def: &OperationDef) -> AddedNode {
        self.insert_node(Node::new(def))
    }

    pub(crate) fn insert_node(&mut self, node: Node) -> AddedNode {
        let added = AddedNode {
            node_id: node.id,
            input_anchors: node.input_anchor_ids(),
            output_anchors: node.output_anchor_ids(),
        };
        tracing::debug!("Graph {}: added {} node {}", self.id, node.signature, node.id);
        self.nodes.insert(node.id, node);
        self.revision += 1;
        added
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, GraphError> {
        if !self.nodes.contains_key(&node_id) {
            return Err(GraphError::NodeNotFound(node_id));
        }

        let downstream: Vec<NodeId> = self
            .edges
            .values()
            .filter(|e| e.from.node == node_id)
            .map(|e| e.to.node)
            .collect();
        self.edges.retain(|_, e| !e.involves_node(node_id));
        for id in downstream {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.mark_stale();
            }
        }

        let node = self
            .nodes
            .shift_remove(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        self.revision += 1;
        tracing::debug!("Graph {}: removed node {}", self.id, node_id);
        Ok(node)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Look up an anchor
    pub fn anchor(&self, anchor: &AnchorId) -> Option<&Anchor> {
        self.nodes.get(&anchor.node)?.anchor(&anchor.key)
    }

    /// Connect an output anchor to an input anchor.
    ///
    /// Rejects, leaving the edge set unchanged, when either anchor is missing,
    /// the direction is wrong, the input is already connected, the types are
    /// incompatible or the edge would close a cycle.
    pub fn add_edge(&mut self, from: &AnchorId, to: &AnchorId) -> Result<EdgeId, GraphError> {
        self.insert_edge(EdgeId::new(), from, to)
    }

    pub(crate) fn insert_edge(
        &mut self,
        id: EdgeId,
        from: &AnchorId,
        to: &AnchorId,
    ) -> Result<EdgeId, GraphError> {
        let source = self
            .anchor(from)
            .ok_or_else(|| GraphError::InvalidAnchor(from.clone()))?;
        let target = self
            .anchor(to)
            .ok_or_else(|| GraphError::InvalidAnchor(to.clone()))?;

        if source.direction != AnchorDirection::Output || target.direction != AnchorDirection::Input {
            return Err(GraphError::InvalidOperation(format!(
                "edge must run from an output anchor to an input anchor, got {from} -> {to}"
            )));
        }

        if let Some(existing) = self.incoming_edge(to) {
            return Err(GraphError::InvalidOperation(format!(
                "input anchor {to} is already connected by edge {}",
                existing.id
            )));
        }

        if !source.anchor_type.can_connect_to(&target.anchor_type) {
            return Err(GraphError::TypeMismatch {
                from: source.anchor_type.clone(),
                to: target.anchor_type.clone(),
            });
        }

        if from.node == to.node || self.reaches(to.node, from.node) {
            return Err(GraphError::CycleDetected {
                from: from.clone(),
                to: to.clone(),
            });
        }

        if self.edges.contains_key(&id) {
            return Err(GraphError::InvalidOperation(format!("duplicate edge id {id}")));
        }

        self.edges.insert(id, Edge::new(id, from.clone(), to.clone()));
        if let Some(node) = self.nodes.get_mut(&to.node) {
            node.mark_stale();
        }
        self.revision += 1;
        tracing::debug!("Graph {}: connected {from} -> {to}", self.id);
        Ok(id)
    }

    /// Whether `goal` is reachable from `start` by following edges
    fn reaches(&self, start: NodeId, goal: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == goal {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.extend(
                self.edges
                    .values()
                    .filter(|e| e.from.node == current)
                    .map(|e| e.to.node),
            );
        }
        false
    }

    /// Remove an edge by ID or by the input anchor it feeds
    pub fn remove_edge(&mut self, edge: impl Into<EdgeRef>) -> Result<Edge, GraphError> {
        let edge = edge.into();
        let id = match &edge {
            EdgeRef::Id(id) => Some(*id).filter(|id| self.edges.contains_key(id)),
            EdgeRef::Target(anchor) => self.incoming_edge(anchor).map(|e| e.id),
        };
        let removed = id
            .and_then(|id| self.edges.shift_remove(&id))
            .ok_or(GraphError::EdgeNotFound(edge))?;

        if let Some(node) = self.nodes.get_mut(&removed.to.node) {
            node.mark_stale();
        }
        self.revision += 1;
        tracing::debug!("Graph {}: disconnected {} -> {}", self.id, removed.from, removed.to);
        Ok(removed)
    }

    /// Get an edge by ID
    pub fn edge(&self, edge_id: EdgeId) -> Option<&Edge> {
        self.edges.get(&edge_id)
    }

    /// Get all edges
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Get the edge feeding an input anchor
    pub fn incoming_edge(&self, anchor: &AnchorId) -> Option<&Edge> {
        self.edges.values().find(|e| &e.to == anchor)
    }

    /// Get edges leaving an output anchor
    pub fn outgoing_edges<'a>(&'a self, anchor: &'a AnchorId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| &e.from == anchor)
    }

    /// Get edges involving a node
    pub fn edges_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.involves_node(node_id))
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Merge new UI-input values into a node and record the changed keys
    pub fn update_ui_inputs(
        &mut self,
        node_id: NodeId,
        update: UiInputsUpdate,
    ) -> Result<UiInputsChanged, GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;

        node.ui_inputs.extend(update.inputs);
        node.last_changed = update.changes;
        if !node.last_changed.is_empty() {
            node.mark_stale();
        }
        self.revision += 1;

        Ok(UiInputsChanged {
            node_id,
            changed: node.last_changed.clone(),
        })
    }

    /// Counter bumped by every mutation that can change evaluation results.
    ///
    /// Moving a node does not count.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy output caches and statuses from a copy of this graph that was
    /// evaluated elsewhere.
    ///
    /// Nothing is copied and `false` is returned when this graph was mutated
    /// after the copy was taken.
    pub fn adopt_results(&mut self, evaluated: &Graph) -> bool {
        if evaluated.id != self.id || evaluated.revision != self.revision {
            return false;
        }
        for source in evaluated.nodes.values() {
            if let Some(node) = self.nodes.get_mut(&source.id) {
                node.cache.clone_from(&source.cache);
                node.status = source.status.clone();
            }
        }
        true
    }

    /// Move a node; display metadata only
    pub fn set_node_pos(&mut self, node_id: NodeId, x: f32, y: f32) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.position = [x, y];
        Ok(())
    }

    /// Get nodes in topological order, ties broken by node ID
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        for edge in self.edges.values() {
            if let Some(degree) = in_degree.get_mut(&edge.to.node) {
                *degree += 1;
            }
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node_id) = ready.pop_first() {
            order.push(node_id);
            for edge in self.edges.values().filter(|e| e.from.node == node_id) {
                if let Some(degree) = in_degree.get_mut(&edge.to.node) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(edge.to.node);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(CycleError);
        }
        Ok(order)
    }

    #[cfg(test)]
    pub(crate) fn force_edge(&mut self, from: AnchorId, to: AnchorId) {
        let id = EdgeId::new();
        self.edges.insert(id, Edge::new(id, from, to));
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error returned by graph mutations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge not found
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeRef),

    /// Anchor does not exist
    #[error("Invalid anchor: {0}")]
    InvalidAnchor(AnchorId),

    /// Operation not allowed on the current graph
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Edge would close a cycle
    #[error("Edge {from} -> {to} would create a cycle")]
    CycleDetected {
        /// Source anchor
        from: AnchorId,
        /// Target anchor
        to: AnchorId,
    },

    /// Incompatible anchor types
    #[error("Type mismatch: cannot connect {from:?} to {to:?}")]
    TypeMismatch {
        /// Source anchor type
        from: AnchorType,
        /// Target anchor type
        to: AnchorType,
    },
}

impl GraphError {
    /// Whether the error is one of the not-found kinds
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound(_) | Self::EdgeNotFound(_) | Self::InvalidAnchor(_))
    }
}

/// Error when graph contains a cycle
#[derive(Debug, thiserror::Error)]
#[error("Graph contains a cycle")]
pub struct CycleError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{create_builtin_registry, ADD, NUMBER, OUTPUT};
    use crate::operation::OperationRegistry;

    fn def<'a>(registry: &'a OperationRegistry, signature: &str) -> &'a OperationDef {
        registry.get(signature).expect("builtin registered")
    }

    fn chain(graph: &mut Graph, registry: &OperationRegistry) -> (AddedNode, AddedNode, AddedNode) {
        let a = graph.add_node(def(registry, NUMBER));
        let b = graph.add_node(def(registry, ADD));
        let c = graph.add_node(def(registry, ADD));
        graph.add_edge(&a.output_anchors[0], &b.input_anchors[0]).unwrap();
        graph.add_edge(&b.output_anchors[0], &c.input_anchors[0]).unwrap();
        (a, b, c)
    }

    #[test]
    fn test_add_node_registers_anchors() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let added = graph.add_node(def(&registry, ADD));

        assert_eq!(added.input_anchors.len(), 2);
        assert_eq!(added.output_anchors.len(), 1);
        assert!(graph.anchor(&added.input_anchors[1]).is_some_and(|a| a.is_input()));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_cycle_rejected_and_edges_unchanged() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let (a, _b, c) = chain(&mut graph, &registry);
        let a2 = graph.add_node(def(&registry, ADD));
        graph.add_edge(&c.output_anchors[0], &a2.input_anchors[0]).unwrap();
        let before: Vec<Edge> = graph.edges().cloned().collect();

        // c -> a2 exists; a2 -> c would close the loop
        let err = graph.add_edge(&a2.output_anchors[0], &c.input_anchors[1]).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));

        // self loop
        let err = graph.add_edge(&c.output_anchors[0], &c.input_anchors[1]).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));

        let after: Vec<Edge> = graph.edges().cloned().collect();
        assert_eq!(before, after);
        assert!(graph.topological_order().is_ok());
        assert!(graph.node(a.node_id).is_some());
    }

    #[test]
    fn test_occupied_input_rejected() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let x = graph.add_node(def(&registry, NUMBER));
        let y = graph.add_node(def(&registry, NUMBER));
        let sum = graph.add_node(def(&registry, ADD));

        let first = graph.add_edge(&x.output_anchors[0], &sum.input_anchors[0]).unwrap();
        let err = graph.add_edge(&y.output_anchors[0], &sum.input_anchors[0]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidOperation(_)));

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.incoming_edge(&sum.input_anchors[0]).map(|e| e.id), Some(first));
    }

    #[test]
    fn test_direction_and_existence_checked() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let x = graph.add_node(def(&registry, NUMBER));
        let sum = graph.add_node(def(&registry, ADD));

        let err = graph.add_edge(&sum.input_anchors[0], &x.output_anchors[0]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidOperation(_)));

        let missing = AnchorId::new(sum.node_id, "nope");
        let err = graph.add_edge(&x.output_anchors[0], &missing).unwrap_err();
        assert_eq!(err, GraphError::InvalidAnchor(missing));
        assert!(err.is_not_found());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_type_mismatch() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let flag = graph.add_node(def(&registry, crate::builtins::BOOLEAN));
        let sum = graph.add_node(def(&registry, ADD));

        let err = graph.add_edge(&flag.output_anchors[0], &sum.input_anchors[0]).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn test_remove_node_cascades_exactly() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let (a, b, c) = chain(&mut graph, &registry);
        let out = graph.add_node(def(&registry, OUTPUT));
        let kept = graph.add_edge(&a.output_anchors[0], &c.input_anchors[1]).unwrap();
        let to_output = graph.add_edge(&c.output_anchors[0], &out.input_anchors[0]).unwrap();

        graph.remove_node(b.node_id).unwrap();

        let remaining: HashSet<EdgeId> = graph.edges().map(|e| e.id).collect();
        assert_eq!(remaining, HashSet::from([kept, to_output]));
        assert!(graph.edges().all(|e| !e.involves_node(b.node_id)));
        assert_eq!(graph.remove_node(b.node_id).unwrap_err(), GraphError::NodeNotFound(b.node_id));
    }

    #[test]
    fn test_remove_edge_by_id_or_target() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let (_a, b, c) = chain(&mut graph, &registry);

        let removed = graph.remove_edge(c.input_anchors[0].clone()).unwrap();
        assert_eq!(removed.from, b.output_anchors[0]);

        let first = graph.edges().next().map(|e| e.id).unwrap();
        graph.remove_edge(first).unwrap();
        assert_eq!(graph.edge_count(), 0);

        let err = graph.remove_edge(first).unwrap_err();
        assert!(matches!(err, GraphError::EdgeNotFound(EdgeRef::Id(_))));
    }

    #[test]
    fn test_update_ui_inputs_records_changes() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let n = graph.add_node(def(&registry, NUMBER));

        let changed = graph
            .update_ui_inputs(n.node_id, UiInputsUpdate::single("value", Value::Float(7.0)))
            .unwrap();
        assert_eq!(changed.changed, vec!["value".to_string()]);

        let node = graph.node(n.node_id).unwrap();
        assert_eq!(node.ui_input("value"), Some(&Value::Float(7.0)));
        assert_eq!(node.last_changed(), ["value".to_string()]);

        let missing = NodeId::new();
        assert_eq!(
            graph.update_ui_inputs(missing, UiInputsUpdate::default()).unwrap_err(),
            GraphError::NodeNotFound(missing)
        );
    }

    #[test]
    fn test_adopt_results_requires_same_revision() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let n = graph.add_node(def(&registry, NUMBER));

        let mut evaluated = graph.clone();
        if let Some(node) = evaluated.node_mut(n.node_id) {
            node.cache.insert("res".to_string(), Value::Float(3.0));
            node.status = crate::node::NodeStatus::Fresh;
        }

        // Moving a node keeps the revision
        graph.set_node_pos(n.node_id, 1.0, 1.0).unwrap();
        let mut moved = graph.clone();
        assert!(moved.adopt_results(&evaluated));
        assert_eq!(moved.node(n.node_id).unwrap().cached_output("res"), Some(&Value::Float(3.0)));
        assert_eq!(moved.node(n.node_id).unwrap().position, [1.0, 1.0]);

        graph
            .update_ui_inputs(n.node_id, UiInputsUpdate::single("value", Value::Float(9.0)))
            .unwrap();
        assert!(!graph.adopt_results(&evaluated));
        assert!(graph.node(n.node_id).unwrap().cached_outputs().is_empty());
        assert_eq!(*graph.node(n.node_id).unwrap().status(), crate::node::NodeStatus::Stale);
    }

    #[test]
    fn test_set_node_pos() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let n = graph.add_node(def(&registry, NUMBER));
        graph.set_node_pos(n.node_id, 12.0, -4.5).unwrap();
        assert_eq!(graph.node(n.node_id).unwrap().position, [12.0, -4.5]);
    }

    #[test]
    fn test_topological_order_is_deterministic() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let (a, b, c) = chain(&mut graph, &registry);

        let order = graph.topological_order().unwrap();
        let pos = |id: NodeId| order.iter().position(|n| *n == id).unwrap();
        assert!(pos(a.node_id) < pos(b.node_id));
        assert!(pos(b.node_id) < pos(c.node_id));
        assert_eq!(order, graph.clone().topological_order().unwrap());
    }

    #[test]
    fn test_topological_order_detects_forced_cycle() {
        let registry = create_builtin_registry();
        let mut graph = Graph::default();
        let (_a, b, c) = chain(&mut graph, &registry);
        graph.force_edge(c.output_anchors[0].clone(), b.input_anchors[1].clone());
        assert!(graph.topological_order().is_err());
    }
}
