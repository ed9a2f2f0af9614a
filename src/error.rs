//! Caller-facing error classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a service failure should be reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The entity does not exist
    NotFound,
    /// The request was rejected before anything was persisted
    BadRequest,
    /// The caller has no access to the entity
    Unauthorized,
    Internal,
}

impl ErrorKind {
    /// Matching HTTP status code, for hosts that expose the services over HTTP
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 403,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::BadRequest => "bad request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}
