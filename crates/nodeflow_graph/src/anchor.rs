// SPDX-License-Identifier: MIT OR Apache-2.0
//! Anchor definitions for node inputs/outputs.

use crate::node::NodeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an anchor by the node it sits on and its key within that node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId {
    /// Owning node
    pub node: NodeId,
    /// Anchor key, unique within the node
    pub key: String,
}

impl AnchorId {
    /// Create a new anchor ID
    pub fn new(node: NodeId, key: impl Into<String>) -> Self {
        Self {
            node,
            key: key.into(),
        }
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.key)
    }
}

/// Anchor direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorDirection {
    /// Input anchor
    Input,
    /// Output anchor
    Output,
}

/// Data type that can flow through anchors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 2D vector
    Vector2,
    /// 3D vector
    Vector3,
    /// 4D vector
    Vector4,
    /// Color (RGBA)
    Color,
    /// String value
    String,
    /// List of values
    List,
    /// Media payload produced by a plugin (image, video frame, ...)
    Media,
    /// Any type (for generic nodes)
    Any,
    /// Plugin-defined type, only compatible with itself
    Custom(String),
}

impl AnchorType {
    /// Check if this type can connect to another type
    pub fn can_connect_to(&self, other: &AnchorType) -> bool {
        if matches!(self, Self::Any) || matches!(other, Self::Any) {
            return true;
        }

        if self == other {
            return true;
        }

        // Implicit conversions
        match (self, other) {
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => true,
            (Self::Float, Self::Vector2 | Self::Vector3 | Self::Vector4) => true,
            (Self::Vector2, Self::Vector3 | Self::Vector4) => true,
            (Self::Vector3, Self::Vector4) => true,
            (Self::Color, Self::Vector4) | (Self::Vector4, Self::Color) => true,
            _ => false,
        }
    }
}

/// An anchor declared by an operation and instantiated on each node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor key
    pub key: String,
    /// Display name
    pub name: String,
    /// Anchor direction
    pub direction: AnchorDirection,
    /// Data type
    pub anchor_type: AnchorType,
    /// Value used by an unconnected input with no matching UI input
    pub default_value: Option<Value>,
}

impl Anchor {
    /// Create a new input anchor
    pub fn input(key: impl Into<String>, name: impl Into<String>, anchor_type: AnchorType) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            direction: AnchorDirection::Input,
            anchor_type,
            default_value: None,
        }
    }

    /// Create a new output anchor
    pub fn output(key: impl Into<String>, name: impl Into<String>, anchor_type: AnchorType) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            direction: AnchorDirection::Output,
            anchor_type,
            default_value: None,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Whether this is an input anchor
    pub fn is_input(&self) -> bool {
        self.direction == AnchorDirection::Input
    }

    /// Whether this is an output anchor
    pub fn is_output(&self) -> bool {
        self.direction == AnchorDirection::Output
    }
}
