//! Blueprint Engine - mapping blueprints from heterogeneous uploads to JSON
//!
//! Provides unified interfaces for:
//! - Format normalization (csv, xml, sql dumps, json) into JSON record arrays
//! - Schema inference with example values
//! - Field-level record transforms validated against input schemas
//! - Blueprint, input definition and version management
//! - Static (queued) and dynamic (synchronous, forwarded) mapping jobs
//! - Artifact storage backends

pub mod auth;
pub mod blueprint;
pub mod config;
pub mod error;
pub mod extract;
pub mod inference;
pub mod jobs;
pub mod normalize;
pub mod storage;
pub mod store;
pub mod transform;

// Re-export commonly used types
pub use storage::{FileSystemStorageBackend, StorageBackend, StorageError};

pub use auth::Caller;
pub use config::{ConfigError, EngineConfig};
pub use error::ErrorKind;
pub use extract::{ExtractError, ExtractResult, SchemaExtractor};

pub use inference::{InferenceConfig, InferenceError, SchemaInferrer, infer_schema};
pub use normalize::{Format, NormalizeError, NormalizedFile, Normalizer};
pub use transform::{TransformEngine, TransformError, transform_document};

// Re-export services
pub use blueprint::{BlueprintError, BlueprintResult, BlueprintService};
pub use jobs::{EndpointClient, HttpEndpointClient, JobDownload, JobError, JobResult, JobService};

// Re-export records
pub use store::{
    Blueprint, Id, InputDefinition, JobType, MappingExecution, MappingJob, MappingStatus,
    OutputDefinition, RecordStore, SourceMapping,
};
