//! Streaming handler interface and format dispatch

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::csv::CsvHandler;
use super::error::{NormalizeError, NormalizeResult};
use super::format::Format;
use super::json::JsonHandler;
use super::sql::SqlHandler;
use super::xml::XmlHandler;
use crate::inference::{InferenceConfig, infer_schema};
use crate::storage::{StorageBackend, StorageError};

/// A finalized canonical artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedFile {
    /// Storage key of the JSON output
    pub path: String,
    /// Format the upload was declared as
    pub format: Format,
    /// Records written (chunks written for JSON passthrough)
    pub count: usize,
}

/// Lifecycle shared by every format handler
///
/// `create` opens the output, `write` accepts decoded text chunks of arbitrary
/// size and `finalize` closes the output. Writing after `finalize` fails with
/// [`NormalizeError::HandleClosed`].
#[async_trait]
pub trait StreamHandler: Send {
    async fn create(&mut self) -> NormalizeResult<()>;

    async fn write(&mut self, chunk: &str) -> NormalizeResult<()>;

    /// Close the output; returns the output key and count
    async fn finalize(&mut self) -> NormalizeResult<(String, usize)>;

    /// Storage keys this handler may have created
    fn artifact_paths(&self) -> Vec<String>;
}

enum HandlerKind {
    Csv(CsvHandler),
    Xml(XmlHandler),
    Sql(SqlHandler),
    Json(JsonHandler),
}

impl HandlerKind {
    fn as_stream(&mut self) -> &mut dyn StreamHandler {
        match self {
            HandlerKind::Csv(h) => h,
            HandlerKind::Xml(h) => h,
            HandlerKind::Sql(h) => h,
            HandlerKind::Json(h) => h,
        }
    }
}

/// Handler for one upload, selected by declared format
pub struct FileHandler {
    format: Format,
    kind: HandlerKind,
    storage: Arc<dyn StorageBackend>,
    output: Option<NormalizedFile>,
    extracted_schema: Option<Value>,
}

impl FileHandler {
    pub fn new(format: Format, storage: Arc<dyn StorageBackend>) -> Self {
        let kind = match format {
            Format::Csv => HandlerKind::Csv(CsvHandler::new(storage.clone())),
            Format::Xml => HandlerKind::Xml(XmlHandler::new(storage.clone())),
            Format::Sql => HandlerKind::Sql(SqlHandler::new(storage.clone())),
            Format::Json => HandlerKind::Json(JsonHandler::new(storage.clone())),
        };
        Self {
            format,
            kind,
            storage,
            output: None,
            extracted_schema: None,
        }
    }

    /// Select a handler from a declared content type
    pub fn for_content_type(
        content_type: &str,
        storage: Arc<dyn StorageBackend>,
    ) -> NormalizeResult<Self> {
        let format = Format::from_content_type(content_type)
            .ok_or_else(|| NormalizeError::UnsupportedFormat(content_type.to_string()))?;
        Ok(Self::new(format, storage))
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// The finalized artifact, if any
    pub fn output(&self) -> Option<&NormalizedFile> {
        self.output.as_ref()
    }

    pub async fn create(&mut self) -> NormalizeResult<()> {
        self.kind.as_stream().create().await
    }

    pub async fn write(&mut self, chunk: &str) -> NormalizeResult<()> {
        if self.output.is_some() {
            return Err(NormalizeError::HandleClosed);
        }
        self.kind.as_stream().write(chunk).await
    }

    pub async fn finalize(&mut self) -> NormalizeResult<NormalizedFile> {
        if self.output.is_some() {
            return Err(NormalizeError::HandleClosed);
        }
        let (path, count) = self.kind.as_stream().finalize().await?;
        let file = NormalizedFile {
            path,
            format: self.format,
            count,
        };
        debug!(format = %file.format, path = %file.path, count = file.count, "Normalized upload");
        self.output = Some(file.clone());
        Ok(file)
    }

    /// Infer the output's schema; computed once and cached
    pub async fn schema(&mut self, config: &InferenceConfig) -> NormalizeResult<Value> {
        if let Some(schema) = &self.extracted_schema {
            return Ok(schema.clone());
        }
        let output = self.output.as_ref().ok_or(NormalizeError::NotFinalized)?;
        let content = self.storage.read_file(&output.path).await?;
        let document: Value = serde_json::from_slice(&content)?;
        let schema = infer_schema(&document, config)?;
        self.extracted_schema = Some(schema.clone());
        Ok(schema)
    }

    /// Remove every artifact this handler produced
    pub async fn discard(&mut self) {
        for path in self.kind.as_stream().artifact_paths() {
            match self.storage.delete_file(&path).await {
                Ok(()) | Err(StorageError::FileNotFound(_)) => {}
                Err(e) => warn!(path = %path, error = %e, "Failed to remove artifact"),
            }
        }
    }
}
