//! Pass-through handler for uploads that are already JSON

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::artifact_key;
use super::error::{NormalizeError, NormalizeResult};
use super::handler::StreamHandler;
use crate::storage::{ArtifactWriter, StorageBackend};

/// Copies text verbatim; the count is the number of chunks written
pub struct JsonHandler {
    storage: Arc<dyn StorageBackend>,
    path: Option<String>,
    sink: Option<ArtifactWriter>,
    chunks: usize,
}

impl JsonHandler {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            path: None,
            sink: None,
            chunks: 0,
        }
    }
}

#[async_trait]
impl StreamHandler for JsonHandler {
    async fn create(&mut self) -> NormalizeResult<()> {
        let path = artifact_key("json");
        self.sink = Some(self.storage.create_writer(&path).await?);
        self.path = Some(path);
        Ok(())
    }

    async fn write(&mut self, chunk: &str) -> NormalizeResult<()> {
        let sink = match (&self.path, self.sink.as_mut()) {
            (None, _) => return Err(NormalizeError::NotCreated),
            (Some(_), None) => return Err(NormalizeError::HandleClosed),
            (Some(_), Some(sink)) => sink,
        };
        sink.write_all(chunk.as_bytes()).await?;
        self.chunks += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> NormalizeResult<(String, usize)> {
        let path = self.path.clone().ok_or(NormalizeError::NotCreated)?;
        let mut sink = self.sink.take().ok_or(NormalizeError::HandleClosed)?;
        sink.shutdown().await?;
        Ok((path, self.chunks))
    }

    fn artifact_paths(&self) -> Vec<String> {
        self.path.iter().cloned().collect()
    }
}
