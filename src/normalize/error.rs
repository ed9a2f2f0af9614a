//! Error types for format normalization

use thiserror::Error;

use crate::inference::InferenceError;
use crate::storage::StorageError;

/// Errors raised while converting a raw upload into canonical records
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// Declared content type has no handler
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Handler used before `create`
    #[error("File handle has not been created")]
    NotCreated,

    /// Handler used after `finalize`
    #[error("File is not open or already closed")]
    HandleClosed,

    /// Schema requested before the output was finalized
    #[error("Output has not been finalized")]
    NotFinalized,

    /// Upload exceeds the configured cap
    #[error("Upload of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    /// Upload is not valid UTF-8
    #[error("Invalid UTF-8 in upload near byte {offset}")]
    InvalidUtf8 { offset: usize },

    /// Delimited text could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    /// Tag-markup could not be parsed
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Artifact storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stream I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking extraction task did not complete
    #[error("Background task failed: {0}")]
    Task(String),

    /// Schema inference over the normalized output failed
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
}

/// Result type for normalization
pub type NormalizeResult<T> = Result<T, NormalizeError>;
