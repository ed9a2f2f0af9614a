//! Schema extraction from raw uploads
//!
//! An upload is normalized into a scratch artifact, its schema is inferred,
//! and the scratch artifact is removed again whatever the outcome.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{debug, info_span, Instrument};

use crate::config::EngineConfig;
use crate::error::ErrorKind;
use crate::inference::InferenceConfig;
use crate::normalize::{NormalizeError, Normalizer};
use crate::storage::StorageBackend;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Zero-byte upload
    #[error("Upload is empty")]
    EmptyUpload,

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Normalize(
                NormalizeError::Storage(_) | NormalizeError::Io(_) | NormalizeError::Task(_),
            ) => ErrorKind::Internal,
            _ => ErrorKind::BadRequest,
        }
    }
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Turns an upload in any supported format into a JSON Schema with examples
#[derive(Clone)]
pub struct SchemaExtractor {
    normalizer: Normalizer,
    inference: InferenceConfig,
}

impl SchemaExtractor {
    pub fn new(storage: Arc<dyn StorageBackend>, config: &EngineConfig) -> Self {
        Self {
            normalizer: Normalizer::new(storage, config),
            inference: InferenceConfig::builder()
                .max_examples(config.max_examples)
                .build(),
        }
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    /// Extract from a stream of declared type and size
    ///
    /// Size and content type are checked before anything is written.
    pub async fn extract<R>(&self, content_type: &str, size: u64, reader: R) -> ExtractResult<Value>
    where
        R: AsyncRead + Unpin + Send,
    {
        if size == 0 {
            return Err(ExtractError::EmptyUpload);
        }
        let format = self.normalizer.check(content_type, size)?;

        let span = info_span!("extract", %format, size);
        async {
            let mut handler = self.normalizer.process(content_type, reader).await?;
            let schema = handler.schema(&self.inference).await;
            handler.discard().await;
            let schema = schema?;
            debug!("Schema extracted");
            Ok(schema)
        }
        .instrument(span)
        .await
    }

    pub async fn extract_bytes(&self, content_type: &str, bytes: &[u8]) -> ExtractResult<Value> {
        self.extract(content_type, bytes.len() as u64, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorageBackend;
    use serde_json::json;
    use tempfile::TempDir;

    fn extractor(temp: &TempDir, max: u64) -> SchemaExtractor {
        let config = EngineConfig::builder().max_upload_bytes(max).build();
        SchemaExtractor::new(Arc::new(FileSystemStorageBackend::new(temp.path())), &config)
    }

    #[tokio::test]
    async fn test_extract_csv_and_clean_up() {
        let temp = TempDir::new().unwrap();
        let schema = extractor(&temp, 1024)
            .extract_bytes("text/csv", b"id,city\n1,Oslo\n2,Lima\n")
            .await
            .unwrap();

        assert_eq!(schema["type"], json!("array"));
        assert_eq!(
            schema["items"]["properties"]["city"]["examples"],
            json!(["Oslo", "Lima"])
        );
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejections_happen_before_io() {
        let temp = TempDir::new().unwrap();
        let extractor = extractor(&temp, 4);

        assert!(matches!(
            extractor.extract_bytes("image/png", b"x").await,
            Err(ExtractError::Normalize(NormalizeError::UnsupportedFormat(_)))
        ));
        assert!(matches!(
            extractor.extract_bytes("text/csv", b"a,b\n1,2\n").await,
            Err(ExtractError::Normalize(NormalizeError::TooLarge { .. }))
        ));
        assert!(matches!(
            extractor.extract_bytes("text/csv", b"").await,
            Err(ExtractError::EmptyUpload)
        ));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
