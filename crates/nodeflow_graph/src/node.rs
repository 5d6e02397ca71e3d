// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node instances.

use crate::anchor::{Anchor, AnchorId};
use crate::operation::{OperationDef, Outputs, UiInputs};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Evaluation state of a node's output cache
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeStatus {
    /// Never evaluated, or its inputs changed since the last evaluation
    #[default]
    Stale,
    /// Output cache matches the current inputs
    Fresh,
    /// The node's operation failed during the last interpretation
    Failed(String),
    /// An upstream node failed, so this node could not be evaluated
    Unresolved,
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Signature of the operation this node instantiates
    pub signature: String,
    /// Display name
    pub name: String,
    /// Position in the graph UI; opaque to the runtime
    pub position: [f32; 2],
    /// Input anchors
    pub inputs: Vec<Anchor>,
    /// Output anchors
    pub outputs: Vec<Anchor>,
    pub(crate) ui_inputs: UiInputs,
    pub(crate) last_changed: Vec<String>,
    pub(crate) cache: Outputs,
    pub(crate) status: NodeStatus,
}

impl Node {
    /// Create a new node from an operation definition
    pub fn new(def: &OperationDef) -> Self {
        Self::with_id(NodeId::new(), def)
    }

    /// Create a node with a known ID
    pub fn with_id(id: NodeId, def: &OperationDef) -> Self {
        let ui_inputs = def
            .ui
            .iter()
            .map(|c| (c.component_id.clone(), c.default_value.clone()))
            .collect();

        Self {
            id,
            signature: def.signature.clone(),
            name: def.name.clone(),
            position: [0.0, 0.0],
            inputs: def.inputs.clone(),
            outputs: def.outputs.clone(),
            ui_inputs,
            last_changed: Vec::new(),
            cache: Outputs::new(),
            status: NodeStatus::Stale,
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Get an input anchor by key
    pub fn input(&self, key: &str) -> Option<&Anchor> {
        self.inputs.iter().find(|a| a.key == key)
    }

    /// Get an output anchor by key
    pub fn output(&self, key: &str) -> Option<&Anchor> {
        self.outputs.iter().find(|a| a.key == key)
    }

    /// Get an anchor by key, inputs first
    pub fn anchor(&self, key: &str) -> Option<&Anchor> {
        self.input(key).or_else(|| self.output(key))
    }

    /// Get all anchors
    pub fn anchors(&self) -> impl Iterator<Item = &Anchor> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// IDs of the input anchors
    pub fn input_anchor_ids(&self) -> Vec<AnchorId> {
        self.inputs.iter().map(|a| AnchorId::new(self.id, a.key.clone())).collect()
    }

    /// IDs of the output anchors
    pub fn output_anchor_ids(&self) -> Vec<AnchorId> {
        self.outputs.iter().map(|a| AnchorId::new(self.id, a.key.clone())).collect()
    }

    /// Current UI-input values
    pub fn ui_inputs(&self) -> &UiInputs {
        &self.ui_inputs
    }

    /// Current value of one UI input
    pub fn ui_input(&self, key: &str) -> Option<&Value> {
        self.ui_inputs.get(key)
    }

    /// UI keys changed by the most recent UI-input update
    pub fn last_changed(&self) -> &[String] {
        &self.last_changed
    }

    /// Cached outputs from the last successful evaluation
    pub fn cached_outputs(&self) -> &Outputs {
        &self.cache
    }

    /// Cached value of one output anchor
    pub fn cached_output(&self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    /// Evaluation status
    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub(crate) fn mark_stale(&mut self) {
        if self.status == NodeStatus::Fresh {
            self.status = NodeStatus::Stale;
        }
    }
}
