//! Error types for record transforms

use thiserror::Error;

use crate::store::Id;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Document is neither a record, a list of records nor a map of records
    #[error("Unsupported JSON structure: {0}")]
    UnsupportedShape(String),

    /// Source mapping has no expressions configured
    #[error("Source mapping {0} has no mapping expressions")]
    MissingMapping(Id),

    /// An expression failed to parse
    #[error("Invalid expression for '{field}': {message}")]
    Compile { field: String, message: String },

    /// An expression failed against a record
    #[error("Evaluation of '{field}' failed: {message}")]
    Evaluation { field: String, message: String },

    /// The source schema itself is not a valid JSON Schema
    #[error("Invalid source schema: {0}")]
    InvalidSchema(String),

    /// A record does not match the source schema
    #[error("Validation failed at path '{path}': {message}")]
    Validation { path: String, message: String },
}

pub type TransformResult<T> = Result<T, TransformError>;
