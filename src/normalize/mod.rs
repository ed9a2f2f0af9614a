//! Format normalization
//!
//! Converts uploads in one of the supported formats into a JSON array artifact
//! in storage. Input is consumed in chunks and handed to a format-specific
//! [`StreamHandler`]:
//!
//! - **csv** - one object per data row, keyed by the header row
//! - **xml** - buffered, then converted element by element
//! - **sql** - executed in an embedded engine, pattern-based fallback
//! - **json** - copied verbatim
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blueprint_engine::config::EngineConfig;
//! use blueprint_engine::normalize::Normalizer;
//! use blueprint_engine::storage::FileSystemStorageBackend;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(FileSystemStorageBackend::new("uploads"));
//! let normalizer = Normalizer::new(storage, &EngineConfig::default());
//! let file = normalizer.normalize_bytes("text/csv", b"name\nAna\n").await?;
//! assert_eq!(file.count, 1);
//! # Ok(())
//! # }
//! ```

mod csv;
mod error;
mod format;
mod handler;
mod json;
pub mod sql;
mod writer;
pub mod xml;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub use error::{NormalizeError, NormalizeResult};
pub use format::Format;
pub use handler::{FileHandler, NormalizedFile, StreamHandler};
pub use writer::JsonArrayWriter;

use crate::config::EngineConfig;
use crate::storage::StorageBackend;

/// Fresh storage key with the given extension
pub(crate) fn artifact_key(extension: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), extension)
}

/// Decodes UTF-8 across chunk boundaries
#[derive(Default)]
struct Utf8Chunks {
    carry: Vec<u8>,
    consumed: usize,
}

impl Utf8Chunks {
    fn push(&mut self, bytes: &[u8]) -> NormalizeResult<String> {
        self.carry.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            // incomplete sequence at the end of the chunk
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(NormalizeError::InvalidUtf8 {
                    offset: self.consumed + e.valid_up_to(),
                });
            }
        };

        let decoded: Vec<u8> = self.carry.drain(..valid).collect();
        let first = self.consumed == 0;
        self.consumed += valid;
        let mut text = String::from_utf8(decoded).map_err(|e| NormalizeError::InvalidUtf8 {
            offset: self.consumed - valid + e.utf8_error().valid_up_to(),
        })?;
        if first && text.starts_with('\u{feff}') {
            text.drain(..'\u{feff}'.len_utf8());
        }
        Ok(text)
    }

    fn finish(&self) -> NormalizeResult<()> {
        if self.carry.is_empty() {
            Ok(())
        } else {
            Err(NormalizeError::InvalidUtf8 {
                offset: self.consumed,
            })
        }
    }
}

/// Streams uploads through the handler for their declared format
#[derive(Clone)]
pub struct Normalizer {
    storage: Arc<dyn StorageBackend>,
    chunk_size: usize,
    max_bytes: u64,
}

impl Normalizer {
    pub fn new(storage: Arc<dyn StorageBackend>, config: &EngineConfig) -> Self {
        Self {
            storage,
            chunk_size: config.read_chunk_size.max(1),
            max_bytes: config.max_upload_bytes,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validate format and size without touching storage
    pub fn check(&self, content_type: &str, size: u64) -> NormalizeResult<Format> {
        let format = Format::from_content_type(content_type)
            .ok_or_else(|| NormalizeError::UnsupportedFormat(content_type.to_string()))?;
        if size > self.max_bytes {
            return Err(NormalizeError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(format)
    }

    /// Normalize an in-memory upload
    pub async fn normalize_bytes(
        &self,
        content_type: &str,
        bytes: &[u8],
    ) -> NormalizeResult<NormalizedFile> {
        self.check(content_type, bytes.len() as u64)?;
        let handler = self.process(content_type, bytes).await?;
        handler.output().cloned().ok_or(NormalizeError::NotFinalized)
    }

    /// Stream an upload through its handler and return the finalized handler
    ///
    /// Artifacts are removed again if anything fails part way.
    pub async fn process<R>(&self, content_type: &str, reader: R) -> NormalizeResult<FileHandler>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut handler = FileHandler::for_content_type(content_type, self.storage.clone())?;
        let span = info_span!("normalize", format = %handler.format());

        match self.feed(&mut handler, reader).instrument(span).await {
            Ok(()) => Ok(handler),
            Err(e) => {
                handler.discard().await;
                Err(e)
            }
        }
    }

    async fn feed<R>(&self, handler: &mut FileHandler, mut reader: R) -> NormalizeResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        handler.create().await?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut decoder = Utf8Chunks::default();
        let mut total: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > self.max_bytes {
                return Err(NormalizeError::TooLarge {
                    size: total,
                    max: self.max_bytes,
                });
            }
            let text = decoder.push(&buf[..n])?;
            if !text.is_empty() {
                handler.write(&text).await?;
            }
        }
        decoder.finish()?;

        let file = handler.finalize().await?;
        debug!(bytes = total, records = file.count, "Upload normalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorageBackend;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn normalizer(temp: &TempDir, chunk: usize, max: u64) -> Normalizer {
        let config = EngineConfig::builder()
            .read_chunk_size(chunk)
            .max_upload_bytes(max)
            .build();
        Normalizer::new(Arc::new(FileSystemStorageBackend::new(temp.path())), &config)
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let bytes = "añb".as_bytes();
        let mut chunks = Utf8Chunks::default();
        assert_eq!(chunks.push(&bytes[..2]).unwrap(), "a");
        assert_eq!(chunks.push(&bytes[2..]).unwrap(), "ñb");
        assert!(chunks.finish().is_ok());
    }

    #[test]
    fn test_utf8_invalid_and_truncated() {
        let mut chunks = Utf8Chunks::default();
        assert!(matches!(
            chunks.push(&[b'a', 0xff]),
            Err(NormalizeError::InvalidUtf8 { offset: 1 })
        ));

        let mut chunks = Utf8Chunks::default();
        chunks.push(&[0xc3]).unwrap();
        assert!(chunks.finish().is_err());
    }

    #[test]
    fn test_bom_removed() {
        let mut chunks = Utf8Chunks::default();
        assert_eq!(chunks.push("\u{feff}a,b".as_bytes()).unwrap(), "a,b");
    }

    #[tokio::test]
    async fn test_small_chunks_match_single_read() {
        let temp = TempDir::new().unwrap();
        let input = "nombre,ciudad\nJosé,Málaga\nZoë,Łódź\n".as_bytes();

        let tiny = normalizer(&temp, 1, 1024).normalize_bytes("text/csv", input).await.unwrap();
        let whole = normalizer(&temp, 4096, 1024).normalize_bytes("text/csv", input).await.unwrap();

        let storage = FileSystemStorageBackend::new(temp.path());
        let a: Value = serde_json::from_slice(&storage.read_file(&tiny.path).await.unwrap()).unwrap();
        let b: Value = serde_json::from_slice(&storage.read_file(&whole.path).await.unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[1], json!({"nombre": "Zoë", "ciudad": "Łódź"}));
    }

    #[tokio::test]
    async fn test_rejections_before_io() {
        let temp = TempDir::new().unwrap();
        let n = normalizer(&temp, 16, 4);

        assert!(matches!(
            n.normalize_bytes("image/png", b"x").await,
            Err(NormalizeError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            n.normalize_bytes("text/csv", b"a,b\n1,2\n").await,
            Err(NormalizeError::TooLarge { size: 8, max: 4 })
        ));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_stream_discards_artifacts() {
        let temp = TempDir::new().unwrap();
        let n = normalizer(&temp, 16, 1024);

        let result = n.process("application/xml", &b"<root><a>"[..]).await;
        assert!(matches!(result, Err(NormalizeError::Xml(_))));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_json_passthrough() {
        let temp = TempDir::new().unwrap();
        let n = normalizer(&temp, 4, 1024);
        let file = n.normalize_bytes("application/json", br#"[{"a":1}]"#).await.unwrap();

        assert_eq!(file.format, Format::Json);
        assert_eq!(file.count, 3);
        let content = n.storage().read_file(&file.path).await.unwrap();
        assert_eq!(content, br#"[{"a":1}]"#);
    }
}
