//! File system storage backend
//!
//! All paths are resolved below a base directory. Paths containing ".." are
//! rejected, and resolved paths of existing files are verified to stay inside
//! the base directory.

use super::{ArtifactReader, ArtifactWriter, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::BufWriter;

/// File system storage backend
#[derive(Debug, Clone)]
pub struct FileSystemStorageBackend {
    base_path: PathBuf,
}

impl FileSystemStorageBackend {
    /// Create a new backend rooted at `base_path`
    ///
    /// ```rust
    /// use blueprint_engine::storage::FileSystemStorageBackend;
    ///
    /// let backend = FileSystemStorageBackend::new("/var/lib/blueprints/uploads");
    /// ```
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Base directory all keys resolve under
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve_path(&self, path: &str) -> StorageResult<PathBuf> {
        let normalized = path.trim_start_matches('/');

        if normalized.contains("..") {
            return Err(StorageError::PermissionDenied(
                "Path traversal (..) not allowed".to_string(),
            ));
        }

        let full = self.base_path.join(normalized);

        if full
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(StorageError::PermissionDenied(
                "Path traversal not allowed".to_string(),
            ));
        }

        if full.exists() {
            let canonical = full
                .canonicalize()
                .map_err(|e| StorageError::IoError(format!("Failed to resolve path: {}", e)))?;

            let base_canonical = self
                .base_path
                .canonicalize()
                .unwrap_or_else(|_| self.base_path.clone());

            if !canonical.starts_with(&base_canonical) {
                return Err(StorageError::PermissionDenied(
                    "Path escapes base directory".to_string(),
                ));
            }

            return Ok(canonical);
        }

        Ok(full)
    }

    async fn ensure_parent(&self, full_path: &Path, path: &str) -> StorageResult<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::IoError(format!("Failed to create directory for {}: {}", path, e))
            })?;
        }
        Ok(())
    }
}

fn map_io(path: &str, action: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::FileNotFound(path.to_string())
    } else {
        StorageError::IoError(format!("Failed to {} {}: {}", action, path, e))
    }
}

#[async_trait]
impl StorageBackend for FileSystemStorageBackend {
    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.resolve_path(path)?;
        fs::read(&full_path)
            .await
            .map_err(|e| map_io(path, "read file", e))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> StorageResult<()> {
        let full_path = self.resolve_path(path)?;
        self.ensure_parent(&full_path, path).await?;

        fs::write(&full_path, content)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to write file {}: {}", path, e)))
    }

    async fn create_writer(&self, path: &str) -> StorageResult<ArtifactWriter> {
        let full_path = self.resolve_path(path)?;
        self.ensure_parent(&full_path, path).await?;

        let file = fs::File::create(&full_path)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to create file {}: {}", path, e)))?;

        Ok(Box::new(BufWriter::new(file)))
    }

    async fn open_reader(&self, path: &str) -> StorageResult<ArtifactReader> {
        let full_path = self.resolve_path(path)?;
        let file = fs::File::open(&full_path)
            .await
            .map_err(|e| map_io(path, "open file", e))?;
        Ok(Box::new(file))
    }

    async fn file_exists(&self, path: &str) -> StorageResult<bool> {
        let full_path = self.resolve_path(path)?;

        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(format!(
                "Failed to check file existence {}: {}",
                path, e
            ))),
        }
    }

    async fn delete_file(&self, path: &str) -> StorageResult<()> {
        let full_path = self.resolve_path(path)?;
        fs::remove_file(&full_path)
            .await
            .map_err(|e| map_io(path, "delete file", e))
    }
}
