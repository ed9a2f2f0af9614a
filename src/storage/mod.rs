//! Artifact storage abstraction
//!
//! Normalized inputs, raw tag-markup scratch files and execution outputs all
//! live behind [`StorageBackend`]. Paths are relative keys; the backend owns
//! where they actually land.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod filesystem;

pub use filesystem::FileSystemStorageBackend;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Incremental writer handed out by [`StorageBackend::create_writer`]
pub type ArtifactWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Chunked reader handed out by [`StorageBackend::open_reader`]
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// Trait for storage backends
///
/// Whole-file helpers are used for small artifacts; large artifacts go through
/// `create_writer` / `open_reader` so callers never hold a full file in memory.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a whole file
    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Write a whole file, replacing any previous content
    async fn write_file(&self, path: &str, content: &[u8]) -> StorageResult<()>;

    /// Create (or truncate) a file and return a writer to stream into it
    async fn create_writer(&self, path: &str) -> StorageResult<ArtifactWriter>;

    /// Open a file for chunked reading
    async fn open_reader(&self, path: &str) -> StorageResult<ArtifactReader>;

    /// Check if a file exists
    async fn file_exists(&self, path: &str) -> StorageResult<bool>;

    /// Delete a file
    async fn delete_file(&self, path: &str) -> StorageResult<()>;
}
