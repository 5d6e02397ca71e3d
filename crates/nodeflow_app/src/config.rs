// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime configuration, stored as RON.

use nodeflow_graph::Format;
use nodeflow_runtime::RuntimeOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current config format version
pub const CONFIG_FORMAT_VERSION: u32 = 1;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "nodeflow.ron";

/// Environment variable overriding the config path
pub const CONFIG_ENV_VAR: &str = "NODEFLOW_CONFIG";

/// Error loading or saving the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("Config I/O error for {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid RON for the config
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: ron::error::SpannedError,
    },

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    /// Config written by a newer version
    #[error("Config version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest supported version
        supported: u32,
    },
}

/// Host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Format version
    pub version: u32,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Interpretations allowed to run at once across all graphs
    pub max_concurrent_interpretations: usize,
    /// Tokio worker threads; `None` uses one per core
    pub worker_threads: Option<usize>,
    /// Document format used when exporting graphs
    pub export_format: Format,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_FORMAT_VERSION,
            log_filter: "info,nodeflow_graph=debug,nodeflow_runtime=debug".to_string(),
            max_concurrent_interpretations: RuntimeOptions::default().max_concurrent_interpretations,
            worker_threads: None,
            export_format: Format::Json,
        }
    }
}

impl RuntimeConfig {
    /// Path the config is read from: `NODEFLOW_CONFIG` or `nodeflow.ron`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = ron::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.version > CONFIG_FORMAT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: CONFIG_FORMAT_VERSION,
            });
        }
        Ok(config)
    }

    /// Save to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Options handed to the graph runtime
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            max_concurrent_interpretations: self.max_concurrent_interpretations.max(1),
        }
    }
}
