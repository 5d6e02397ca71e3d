// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operation definitions and the capability table they are registered in.
//!
//! Each node signature maps to one [`OperationDef`]: the anchors a node of
//! that type exposes, the UI components that edit its inputs, and the
//! [`Operation`] that evaluates it. The registry is built once at startup and
//! shared read-only with the graph manager and the interpreter.

use crate::anchor::Anchor;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Resolved input values by anchor key
pub type Inputs = IndexMap<String, Value>;

/// Computed output values by anchor key
pub type Outputs = IndexMap<String, Value>;

/// UI-input values by component ID
pub type UiInputs = IndexMap<String, Value>;

/// Error raised by an operation while evaluating a node
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A pure node operation: inputs and UI state in, outputs out
pub trait Operation: Send + Sync {
    /// Compute the node's outputs.
    ///
    /// `requested` lists the output keys that downstream nodes consume; an
    /// operation may skip work for the others.
    fn evaluate(
        &self,
        inputs: &Inputs,
        ui: &UiInputs,
        requested: &[String],
    ) -> Result<Outputs, OperationError>;
}

impl<F> Operation for F
where
    F: Fn(&Inputs, &UiInputs, &[String]) -> Result<Outputs, OperationError> + Send + Sync,
{
    fn evaluate(
        &self,
        inputs: &Inputs,
        ui: &UiInputs,
        requested: &[String],
    ) -> Result<Outputs, OperationError> {
        self(inputs, ui, requested)
    }
}

/// Operation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationCategory {
    /// Input nodes (constants, parameters)
    Input,
    /// Output nodes; these are the sinks the interpreter evaluates towards
    Output,
    /// Math operations
    Math,
    /// Media filters and transforms
    Media,
    /// Utility nodes
    Utility,
    /// Custom/plugin-defined
    Custom,
}

/// Widget kind used by the presentation layer to edit a UI input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiComponentKind {
    /// Numeric slider
    Slider {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
        /// Step size
        step: f64,
    },
    /// Color picker
    ColorPicker,
    /// Radio group of `(label, value)` options
    Radio {
        /// Options in display order
        options: Vec<(String, String)>,
    },
    /// Free text input
    TextInput,
    /// Push button
    Button,
}

/// UI configuration for one UI input of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiComponent {
    /// Component ID, used as the key in the node's UI-input map
    pub component_id: String,
    /// Display label
    pub label: String,
    /// Widget kind
    pub kind: UiComponentKind,
    /// Initial value for new nodes
    pub default_value: Value,
    /// Whether changing this input requires the graph to be recomputed
    pub updates_backend: bool,
}

impl UiComponent {
    /// Create a new UI component
    pub fn new(
        component_id: impl Into<String>,
        label: impl Into<String>,
        kind: UiComponentKind,
        default_value: Value,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            label: label.into(),
            kind,
            default_value,
            updates_backend: false,
        }
    }

    /// Mark this component as affecting computation
    pub fn updates_backend(mut self) -> Self {
        self.updates_backend = true;
        self
    }
}

/// Definition of an operation: the template nodes are instantiated from
#[derive(Clone)]
pub struct OperationDef {
    /// Unique signature, e.g. `input.number`
    pub signature: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: OperationCategory,
    /// Description
    pub description: String,
    /// Declared input anchors
    pub inputs: Vec<Anchor>,
    /// Declared output anchors
    pub outputs: Vec<Anchor>,
    /// UI components editing this node's UI inputs
    pub ui: Vec<UiComponent>,
    /// Evaluation function
    pub operation: Arc<dyn Operation>,
}

impl OperationDef {
    /// Create a definition with no anchors or UI
    pub fn new(
        signature: impl Into<String>,
        name: impl Into<String>,
        category: OperationCategory,
        operation: impl Operation + 'static,
    ) -> Self {
        Self {
            signature: signature.into(),
            name: name.into(),
            category,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            ui: Vec::new(),
            operation: Arc::new(operation),
        }
    }

    /// Create a definition evaluated by a closure
    pub fn from_fn<F>(
        signature: impl Into<String>,
        name: impl Into<String>,
        category: OperationCategory,
        evaluate: F,
    ) -> Self
    where
        F: Fn(&Inputs, &UiInputs, &[String]) -> Result<Outputs, OperationError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(signature, name, category, evaluate)
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare an input anchor
    pub fn with_input(mut self, anchor: Anchor) -> Self {
        self.inputs.push(anchor);
        self
    }

    /// Declare an output anchor
    pub fn with_output(mut self, anchor: Anchor) -> Self {
        self.outputs.push(anchor);
        self
    }

    /// Declare a UI component
    pub fn with_ui(mut self, component: UiComponent) -> Self {
        self.ui.push(component);
        self
    }

    /// Get a UI component by ID
    pub fn ui_component(&self, component_id: &str) -> Option<&UiComponent> {
        self.ui.iter().find(|c| c.component_id == component_id)
    }

    /// Whether changing the given UI input requires recomputation.
    ///
    /// Keys without a UI component are treated as presentation-only.
    pub fn updates_backend(&self, component_id: &str) -> bool {
        self.ui_component(component_id)
            .is_some_and(|c| c.updates_backend)
    }

    /// Whether nodes of this type are evaluation sinks
    pub fn is_sink(&self) -> bool {
        self.category == OperationCategory::Output
    }
}

impl fmt::Debug for OperationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDef")
            .field("signature", &self.signature)
            .field("category", &self.category)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("ui", &self.ui)
            .finish_non_exhaustive()
    }
}

/// Registry of available operations, keyed by signature
#[derive(Debug, Default)]
pub struct OperationRegistry {
    types: IndexMap<String, OperationDef>,
}

impl OperationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Register an operation, replacing any previous definition of the signature
    pub fn register(&mut self, def: OperationDef) {
        if self.types.contains_key(&def.signature) {
            tracing::warn!("Replacing operation definition for {}", def.signature);
        }
        self.types.insert(def.signature.clone(), def);
    }

    /// Get an operation by signature
    pub fn get(&self, signature: &str) -> Option<&OperationDef> {
        self.types.get(signature)
    }

    /// Whether a signature is registered
    pub fn contains(&self, signature: &str) -> bool {
        self.types.contains_key(signature)
    }

    /// Get all registered operations
    pub fn operations(&self) -> impl Iterator<Item = &OperationDef> {
        self.types.values()
    }

    /// Get operations by category
    pub fn operations_in_category(
        &self,
        category: OperationCategory,
    ) -> impl Iterator<Item = &OperationDef> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
