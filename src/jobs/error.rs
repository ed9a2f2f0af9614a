//! Error types for job orchestration

use thiserror::Error;
use uuid::Uuid;

use super::endpoint::EndpointError;
use crate::error::ErrorKind;
use crate::normalize::NormalizeError;
use crate::storage::StorageError;
use crate::store::{Id, JobType, StoreError};
use crate::transform::TransformError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Caller is neither owner, organization member nor admin
    #[error("Not authorized to access {entity} {id}")]
    Unauthorized { entity: &'static str, id: Id },

    /// No job carries this external identifier
    #[error("Mapping job with UUID {0} not found")]
    UnknownJob(Uuid),

    /// Mapping is not part of the job's input definition
    #[error("Source mapping {source_mapping_id} not found in input definition of job {job_id}")]
    ForeignMapping { job_id: Id, source_mapping_id: Id },

    #[error("Operation requires a {expected:?} job, job {job_id} is {actual:?}")]
    WrongJobType {
        job_id: Id,
        expected: JobType,
        actual: JobType,
    },

    #[error("Dynamic mapping jobs require an external API endpoint")]
    MissingEndpoint,

    #[error("External API endpoint rejected: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Static execution has no normalized input recorded
    #[error("No input file specified for execution {0}")]
    MissingInput(Id),

    #[error("No output file available for execution {0}")]
    NoOutput(Id),

    #[error("No execution of job {0} produced a JSON output")]
    NoJobOutputs(Id),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Execution queue is shut down")]
    QueueClosed,

    /// Blocking evaluation task failed to complete
    #[error("Task failed: {0}")]
    Task(String),
}

pub type JobResult<T> = Result<T, JobError>;

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Store(StoreError::NotFound { .. })
            | JobError::UnknownJob(_)
            | JobError::ForeignMapping { .. }
            | JobError::NoJobOutputs(_)
            | JobError::Storage(StorageError::FileNotFound(_)) => ErrorKind::NotFound,

            JobError::Unauthorized { .. } => ErrorKind::Unauthorized,

            JobError::WrongJobType { .. }
            | JobError::MissingEndpoint
            | JobError::Endpoint(_)
            | JobError::PayloadTooLarge { .. }
            | JobError::Transform(_)
            | JobError::MissingInput(_)
            | JobError::NoOutput(_)
            | JobError::InvalidInput(_) => ErrorKind::BadRequest,

            JobError::Normalize(e) => match e {
                NormalizeError::Storage(_)
                | NormalizeError::Io(_)
                | NormalizeError::Task(_) => ErrorKind::Internal,
                _ => ErrorKind::BadRequest,
            },

            JobError::Store(StoreError::Poisoned(_))
            | JobError::Storage(_)
            | JobError::Json(_)
            | JobError::Io(_)
            | JobError::QueueClosed
            | JobError::Task(_) => ErrorKind::Internal,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            JobError::MissingEndpoint => format!(
                "{self}\n\nHint: Set external_api_endpoint when creating a DYNAMIC job."
            ),
            JobError::Endpoint(e) => format!(
                "External API endpoint is not reachable: {e}\n\nHint: The endpoint must answer a HEAD request with a 2xx status."
            ),
            JobError::PayloadTooLarge { max, .. } => format!(
                "Request body too large (max {max} bytes)\n\nHint: Split the payload or use a static job with file uploads."
            ),
            JobError::Normalize(NormalizeError::UnsupportedFormat(content_type)) => format!(
                "Unsupported file type: {content_type}\n\nHint: Upload JSON, CSV, XML or SQL files."
            ),
            JobError::NoOutput(id) => format!(
                "No output file available for execution {id}\n\nHint: Wait until the execution has finished successfully."
            ),
            _ => self.to_string(),
        }
    }
}
