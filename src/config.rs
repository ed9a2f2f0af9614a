//! Engine configuration
//!
//! Limits, timeouts and the upload directory shared by the normalizer, the
//! schema extractor and the job orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`EngineConfig`]
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Runtime configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory that backs artifact storage
    pub upload_dir: PathBuf,

    /// Largest accepted upload for schema extraction and static executions
    pub max_upload_bytes: u64,

    /// Largest accepted dynamic payload (serialized JSON size)
    pub max_dynamic_payload_bytes: u64,

    /// Aggregated job downloads up to this many input bytes are built in memory
    pub aggregate_inline_limit: u64,

    /// Timeout for the endpoint reachability probe
    pub probe_timeout_secs: u64,

    /// Timeout for forwarding a dynamic result
    pub forward_timeout_secs: u64,

    /// Example values kept per leaf field during inference
    pub max_examples: usize,

    /// Chunk size used when streaming uploads and artifacts
    pub read_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 30 * MIB,
            max_dynamic_payload_bytes: MIB,
            aggregate_inline_limit: 50 * MIB,
            probe_timeout_secs: 5,
            forward_timeout_secs: 10,
            max_examples: 3,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for custom configuration
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `UPLOAD_DIR` and `MAX_UPLOAD_SIZE_BYTES` from the environment
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(dir) = std::env::var("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("MAX_UPLOAD_SIZE_BYTES") {
            self.max_upload_bytes = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "MAX_UPLOAD_SIZE_BYTES",
                value,
            })?;
        }
        Ok(self)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the storage directory
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    /// Set the upload size cap
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Set the dynamic payload size cap
    pub fn max_dynamic_payload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_dynamic_payload_bytes = bytes;
        self
    }

    /// Set the threshold between inline and streamed aggregate downloads
    pub fn aggregate_inline_limit(mut self, bytes: u64) -> Self {
        self.config.aggregate_inline_limit = bytes;
        self
    }

    /// Set the probe timeout in seconds
    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs;
        self
    }

    /// Set the forward timeout in seconds
    pub fn forward_timeout_secs(mut self, secs: u64) -> Self {
        self.config.forward_timeout_secs = secs;
        self
    }

    /// Set the number of examples kept per leaf field
    pub fn max_examples(mut self, max: usize) -> Self {
        self.config.max_examples = max;
        self
    }

    /// Set the streaming chunk size (at least one byte)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
