// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values carried along edges and stored as UI inputs.

use crate::anchor::AnchorType;
use serde::{Deserialize, Serialize};

/// A value that flows between anchors or sits in a node's UI-input map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// Color (RGBA)
    Color([f32; 4]),
    /// String
    String(String),
    /// Ordered list of values
    List(Vec<Value>),
}

impl Value {
    /// Get the anchor type matching this value
    pub fn value_type(&self) -> AnchorType {
        match self {
            Self::Bool(_) => AnchorType::Bool,
            Self::Int(_) => AnchorType::Int,
            Self::Float(_) => AnchorType::Float,
            Self::Vector2(_) => AnchorType::Vector2,
            Self::Vector3(_) => AnchorType::Vector3,
            Self::Vector4(_) => AnchorType::Vector4,
            Self::Color(_) => AnchorType::Color,
            Self::String(_) => AnchorType::String,
            Self::List(_) => AnchorType::List,
        }
    }

    /// Read the value as a number, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Read the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Read the value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
