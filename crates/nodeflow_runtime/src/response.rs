// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tagged response envelope for queries crossing a process boundary.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Success-or-error envelope, serialized with a `status` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryResponse<T> {
    /// The query succeeded
    Success {
        /// Result payload
        data: T,
    },
    /// The query failed
    Error {
        /// Human-readable failure
        message: String,
    },
}

impl<T> QueryResponse<T> {
    /// Whether this is a success response
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Convert back into a `Result`
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Error { message } => Err(message),
        }
    }
}

impl<T, E: Display> From<Result<T, E>> for QueryResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(e) => Self::Error {
                message: e.to_string(),
            },
        }
    }
}
