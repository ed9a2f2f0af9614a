//! Incremental JSON array output

use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::error::{NormalizeError, NormalizeResult};
use crate::storage::{ArtifactWriter, StorageBackend};

/// Streams records into a JSON array artifact
///
/// `[` is written on creation, a `,` before every record after the first and
/// `]` on [`finish`](Self::finish). Nothing already written is read back.
pub struct JsonArrayWriter {
    path: String,
    sink: Option<ArtifactWriter>,
    count: usize,
}

impl JsonArrayWriter {
    /// Create the artifact and open the array
    pub async fn create(storage: &dyn StorageBackend, path: impl Into<String>) -> NormalizeResult<Self> {
        let path = path.into();
        let mut sink = storage.create_writer(&path).await?;
        sink.write_all(b"[").await?;
        Ok(Self {
            path,
            sink: Some(sink),
            count: 0,
        })
    }

    /// Append one record
    pub async fn write_record(&mut self, record: &Value) -> NormalizeResult<()> {
        let sink = self.sink.as_mut().ok_or(NormalizeError::HandleClosed)?;
        if self.count > 0 {
            sink.write_all(b",").await?;
        }
        sink.write_all(&serde_json::to_vec(record)?).await?;
        self.count += 1;
        Ok(())
    }

    /// Close the array and flush; returns the number of records written
    pub async fn finish(&mut self) -> NormalizeResult<usize> {
        let mut sink = self.sink.take().ok_or(NormalizeError::HandleClosed)?;
        sink.write_all(b"]").await?;
        sink.shutdown().await?;
        Ok(self.count)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }
}
