// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge definitions for the graph.

use crate::anchor::AnchorId;
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    /// Create a new random edge ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A directed edge from an output anchor to an input anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    /// Source (output) anchor
    pub from: AnchorId,
    /// Target (input) anchor
    pub to: AnchorId,
}

impl Edge {
    /// Create a new edge
    pub fn new(id: EdgeId, from: AnchorId, to: AnchorId) -> Self {
        Self { id, from, to }
    }

    /// Check if this edge involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from.node == node_id || self.to.node == node_id
    }
}

/// Selects an edge either by its ID or by the input anchor it feeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeRef {
    /// Edge ID
    Id(EdgeId),
    /// Target input anchor; at most one edge can match
    Target(AnchorId),
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Target(anchor) => write!(f, "edge into {anchor}"),
        }
    }
}

impl From<EdgeId> for EdgeRef {
    fn from(id: EdgeId) -> Self {
        Self::Id(id)
    }
}

impl From<AnchorId> for EdgeRef {
    fn from(anchor: AnchorId) -> Self {
        Self::Target(anchor)
    }
}
