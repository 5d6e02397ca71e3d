// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph manager owning every open graph.
//!
//! Each mutating call looks up the target graph, applies the change under the
//! graph's write lock, classifies it into event kinds and notifies the
//! matching subscribers before returning. Subscribers receive a copy of the
//! graph taken under the lock and run after it is released.
//!
//! Interpretation works on a copy too. Its caches are written back only when
//! the graph was not mutated in the meantime.

use crate::bus::{DispatchSummary, EventBus};
use crate::event::{EventSet, GraphChange, GraphEvent, Participant, SubscriberScope};
use crate::output::OutputIdsListener;
use crate::subscriber::{GraphSubscriber, SubscriberId, Subscription};
use indexmap::IndexMap;
use nodeflow_graph::builtins::{DEFAULT_OUTPUT_ID, OUTPUT, OUTPUT_ID_KEY};
use nodeflow_graph::document::{self, DocumentError, Format};
use nodeflow_graph::{
    AddedNode, AnchorId, EdgeId, EdgeRef, EvaluationError, EvaluationScope, Graph, GraphError,
    GraphId, InterpretationReport, Interpreter, NodeId, OperationRegistry, UiInputsChanged,
    UiInputsUpdate, Value,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

type OutputIdTable = IndexMap<(GraphId, NodeId), String>;

/// Error returned by the graph manager
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// No graph with this ID
    #[error("Graph does not exist: {0}")]
    GraphNotFound(GraphId),

    /// No operation registered for the signature
    #[error("Unknown node signature: {0}")]
    UnknownSignature(String),

    /// Graph mutation rejected
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Import/export failure
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Interpretation failure
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Owns all graphs and dispatches their change events
pub struct GraphManager {
    operations: Arc<OperationRegistry>,
    interpreter: Interpreter,
    graphs: RwLock<IndexMap<GraphId, Arc<RwLock<Graph>>>>,
    bus: EventBus,
    output_ids: RwLock<OutputIdTable>,
    output_listeners: RwLock<Vec<Arc<dyn OutputIdsListener>>>,
}

impl GraphManager {
    /// Create a manager over an operation registry
    pub fn new(operations: Arc<OperationRegistry>) -> Self {
        Self {
            interpreter: Interpreter::new(Arc::clone(&operations)),
            operations,
            graphs: RwLock::new(IndexMap::new()),
            bus: EventBus::new(),
            output_ids: RwLock::new(IndexMap::new()),
            output_listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registry node signatures are resolved against
    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    /// The subscriber table
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to changes of one graph, or of all graphs
    pub fn subscribe(
        &self,
        scope: SubscriberScope,
        subscription: Subscription,
        subscriber: Arc<dyn GraphSubscriber>,
    ) -> SubscriberId {
        self.bus.subscribe(scope, subscription, subscriber)
    }

    /// Remove a subscriber, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Be told the set of live output IDs whenever it changes
    pub fn watch_output_ids(&self, listener: Arc<dyn OutputIdsListener>) {
        self.output_listeners.write().push(listener);
    }

    // ========================================================================
    // Graph lifecycle
    // ========================================================================

    /// Create an empty graph
    pub fn create_graph(&self, name: impl Into<String>) -> GraphId {
        self.load_graph(Graph::new(name))
    }

    /// Take ownership of an existing graph
    pub fn load_graph(&self, graph: Graph) -> GraphId {
        let id = graph.id;
        let tracked: Vec<(NodeId, String)> = graph
            .nodes()
            .filter(|n| n.signature == OUTPUT)
            .map(|n| (n.id, Self::output_id_of(&graph, n.id)))
            .collect();
        self.graphs.write().insert(id, Arc::new(RwLock::new(graph)));

        let changed = self.edit_output_ids(|table| {
            for (node_id, output_id) in tracked {
                table.insert((id, node_id), output_id);
            }
        });
        self.announce_output_ids(changed);
        tracing::info!("Opened graph {}", id);
        id
    }

    /// Import a graph document and notify subscribers
    pub fn import_graph(
        &self,
        format: Format,
        data: &str,
        participant: Participant,
    ) -> Result<GraphId, ManagerError> {
        let graph = document::import(format, data, &self.operations)?;
        let id = self.load_graph(graph);

        let handle = self.graph(id)?;
        self.notify_after(handle.read(), [GraphEvent::GraphUpdated], participant);
        Ok(id)
    }

    /// Export a graph document
    pub fn export_graph(&self, graph_id: GraphId, format: Format) -> Result<String, ManagerError> {
        self.with_graph(graph_id, |graph| document::export(graph, format))?
            .map_err(ManagerError::from)
    }

    /// Delete graphs, returning how many existed
    pub fn delete_graphs(&self, graph_ids: &[GraphId]) -> usize {
        let mut graphs = self.graphs.write();
        let removed = graph_ids
            .iter()
            .filter(|id| graphs.shift_remove(*id).is_some())
            .count();
        drop(graphs);

        let changed = self.edit_output_ids(|table| {
            table.retain(|(graph_id, _), _| !graph_ids.contains(graph_id));
        });
        self.announce_output_ids(changed);
        tracing::info!("Deleted {} graph(s)", removed);
        removed
    }

    /// IDs of all open graphs
    pub fn graph_ids(&self) -> Vec<GraphId> {
        self.graphs.read().keys().copied().collect()
    }

    /// Whether a graph is open
    pub fn contains(&self, graph_id: GraphId) -> bool {
        self.graphs.read().contains_key(&graph_id)
    }

    /// Run a read-only query against a graph
    pub fn with_graph<R>(
        &self,
        graph_id: GraphId,
        f: impl FnOnce(&Graph) -> R,
    ) -> Result<R, ManagerError> {
        let handle = self.graph(graph_id)?;
        let guard = handle.read();
        Ok(f(&guard))
    }

    /// Clone the current state of a graph
    pub fn snapshot(&self, graph_id: GraphId) -> Result<Graph, ManagerError> {
        self.with_graph(graph_id, Graph::clone)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Instantiate a node from a registered operation
    pub fn add_node(
        &self,
        graph_id: GraphId,
        signature: &str,
        participant: Participant,
    ) -> Result<AddedNode, ManagerError> {
        let def = self
            .operations
            .get(signature)
            .ok_or_else(|| ManagerError::UnknownSignature(signature.to_string()))?;

        let handle = self.graph(graph_id)?;
        let mut graph = handle.write();
        let added = graph.add_node(def);
        let changed = (signature == OUTPUT)
            .then(|| {
                let output_id = Self::output_id_of(&graph, added.node_id);
                self.edit_output_ids(|table| {
                    table.insert((graph_id, added.node_id), output_id);
                })
            })
            .flatten();

        self.notify_after(graph, [GraphEvent::GraphUpdated], participant);
        self.announce_output_ids(changed);
        Ok(added)
    }

    /// Connect an output anchor to an input anchor
    pub fn add_edge(
        &self,
        graph_id: GraphId,
        from: &AnchorId,
        to: &AnchorId,
        participant: Participant,
    ) -> Result<EdgeId, ManagerError> {
        let handle = self.graph(graph_id)?;
        let mut graph = handle.write();
        let edge_id = graph.add_edge(from, to)?;

        self.notify_after(graph, [GraphEvent::GraphUpdated], participant);
        Ok(edge_id)
    }

    /// Remove a node and its edges
    pub fn remove_node(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        participant: Participant,
    ) -> Result<(), ManagerError> {
        let handle = self.graph(graph_id)?;
        let mut graph = handle.write();
        graph.remove_node(node_id)?;
        let changed = self.edit_output_ids(|table| {
            table.shift_remove(&(graph_id, node_id));
        });

        self.notify_after(graph, [GraphEvent::GraphUpdated], participant);
        self.announce_output_ids(changed);
        Ok(())
    }

    /// Remove an edge by ID or by the input anchor it feeds
    pub fn remove_edge(
        &self,
        graph_id: GraphId,
        edge: impl Into<EdgeRef>,
        participant: Participant,
    ) -> Result<(), ManagerError> {
        let handle = self.graph(graph_id)?;
        let mut graph = handle.write();
        graph.remove_edge(edge)?;

        self.notify_after(graph, [GraphEvent::GraphUpdated], participant);
        Ok(())
    }

    /// Merge UI-input values into a node.
    ///
    /// Subscribers are notified only when at least one changed key is
    /// declared to update the backend.
    pub fn update_ui_inputs(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        update: UiInputsUpdate,
        participant: Participant,
    ) -> Result<UiInputsChanged, ManagerError> {
        let handle = self.graph(graph_id)?;
        let mut graph = handle.write();
        let changed = graph.update_ui_inputs(node_id, update)?;

        let signature = graph
            .node(node_id)
            .map(|n| n.signature.clone())
            .unwrap_or_default();
        let output_ids_changed = (signature == OUTPUT)
            .then(|| {
                let output_id = Self::output_id_of(&graph, node_id);
                self.edit_output_ids(|table| {
                    table.insert((graph_id, node_id), output_id);
                })
            })
            .flatten();

        let updates_backend = self
            .operations
            .get(&signature)
            .is_some_and(|def| changed.changed.iter().any(|key| def.updates_backend(key)));

        if updates_backend {
            self.notify_after(graph, [GraphEvent::UiInputsUpdated], participant);
        } else {
            drop(graph);
            tracing::debug!(
                "Graph {}: UI change on {} is presentation-only, not recomputing",
                graph_id,
                node_id
            );
        }
        self.announce_output_ids(output_ids_changed);
        Ok(changed)
    }

    /// Move a node; never notifies subscribers
    pub fn set_node_pos(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        x: f32,
        y: f32,
        participant: Participant,
    ) -> Result<(), ManagerError> {
        let handle = self.graph(graph_id)?;
        let mut graph = handle.write();
        graph.set_node_pos(node_id, x, y)?;
        tracing::trace!("Graph {}: {:?} moved {} to ({}, {})", graph_id, participant, node_id, x, y);
        Ok(())
    }

    // ========================================================================
    // Outputs and interpretation
    // ========================================================================

    /// Output IDs of every live output node
    pub fn output_ids(&self) -> BTreeSet<String> {
        self.output_ids.read().values().cloned().collect()
    }

    /// Output ID of one output node
    pub fn output_id(&self, graph_id: GraphId, node_id: NodeId) -> Option<String> {
        self.output_ids.read().get(&(graph_id, node_id)).cloned()
    }

    /// Interpret a graph now, on the calling thread.
    ///
    /// Evaluation runs on a copy with no lock held, so mutations and queries
    /// on the graph proceed meanwhile. The refreshed caches are kept only if
    /// the graph is unchanged when evaluation ends; otherwise the change that
    /// got in between has already requested another pass.
    pub fn interpret(
        &self,
        graph_id: GraphId,
        scope: EvaluationScope,
    ) -> Result<InterpretationReport, ManagerError> {
        let handle = self.graph(graph_id)?;
        let mut working = Graph::clone(&handle.read());
        let report = self.interpreter.run(&mut working, scope)?;

        if !handle.write().adopt_results(&working) {
            tracing::debug!(
                "Graph {} changed during interpretation, discarding refreshed caches",
                graph_id
            );
        }
        Ok(report)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn graph(&self, graph_id: GraphId) -> Result<Arc<RwLock<Graph>>, ManagerError> {
        self.graphs
            .read()
            .get(&graph_id)
            .cloned()
            .ok_or(ManagerError::GraphNotFound(graph_id))
    }

    fn output_id_of(graph: &Graph, node_id: NodeId) -> String {
        graph
            .node(node_id)
            .and_then(|n| n.ui_input(OUTPUT_ID_KEY))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_OUTPUT_ID)
            .to_string()
    }

    /// Apply an edit to the output-ID table, returning the new live set if it changed
    fn edit_output_ids(&self, edit: impl FnOnce(&mut OutputIdTable)) -> Option<BTreeSet<String>> {
        let mut table = self.output_ids.write();
        let before: BTreeSet<String> = table.values().cloned().collect();
        edit(&mut table);
        let after: BTreeSet<String> = table.values().cloned().collect();
        (before != after).then_some(after)
    }

    fn announce_output_ids(&self, changed: Option<BTreeSet<String>>) {
        let Some(output_ids) = changed else {
            return;
        };
        tracing::debug!("Live output IDs changed: {:?}", output_ids);
        let listeners = self.output_listeners.read().clone();
        for listener in &listeners {
            listener.on_output_ids_changed(&output_ids);
        }
    }

    /// Notify subscribers of a change, releasing the graph guard first
    fn notify_after(
        &self,
        graph: impl Deref<Target = Graph>,
        events: impl IntoIterator<Item = GraphEvent>,
        participant: Participant,
    ) -> DispatchSummary {
        let events: EventSet = events.into_iter().collect();
        let subscribers = self.bus.matching(graph.id, &events, participant);
        if subscribers.is_empty() {
            return DispatchSummary::default();
        }
        let snapshot = Graph::clone(&graph);
        drop(graph);

        self.bus.deliver(
            subscribers,
            &GraphChange {
                graph_id: snapshot.id,
                graph: &snapshot,
                events: &events,
                participant,
            },
        )
    }
}
