// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change events fired by the graph manager.

use nodeflow_graph::{Graph, GraphId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of change applied to a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphEvent {
    /// Nodes or edges changed
    GraphUpdated,
    /// UI inputs that affect computation changed
    UiInputsUpdated,
}

impl GraphEvent {
    /// Every event kind
    pub fn all() -> &'static [GraphEvent] {
        &[GraphEvent::GraphUpdated, GraphEvent::UiInputsUpdated]
    }
}

/// Set of event kinds
pub type EventSet = HashSet<GraphEvent>;

/// Who caused a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Participant {
    /// The presentation layer, on behalf of the user
    Ui,
    /// Internal recomputation or other runtime-driven changes
    System,
    /// A graph import
    Import,
}

impl Participant {
    /// Every participant
    pub fn all() -> &'static [Participant] {
        &[Participant::Ui, Participant::System, Participant::Import]
    }
}

/// Which graphs a subscriber listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberScope {
    /// A single graph
    Graph(GraphId),
    /// Every graph
    All,
}

/// A change delivered to subscribers
#[derive(Debug, Clone, Copy)]
pub struct GraphChange<'a> {
    /// Changed graph
    pub graph_id: GraphId,
    /// The graph after the change
    pub graph: &'a Graph,
    /// Event kinds fired by the change
    pub events: &'a EventSet,
    /// Who caused the change
    pub participant: Participant,
}
