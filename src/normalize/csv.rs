//! Delimited text handler

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::artifact_key;
use super::error::{NormalizeError, NormalizeResult};
use super::handler::StreamHandler;
use super::writer::JsonArrayWriter;
use crate::storage::StorageBackend;

/// Converts CSV text into one object per data row
///
/// The first non-blank line is the header. Cell values are trimmed strings;
/// short rows get `null` for missing columns and extra cells are dropped.
pub struct CsvHandler {
    storage: Arc<dyn StorageBackend>,
    writer: Option<JsonArrayWriter>,
    headers: Option<Vec<String>>,
    /// Text after the last complete row
    pending: String,
}

impl CsvHandler {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            writer: None,
            headers: None,
            pending: String::new(),
        }
    }

    fn parse_block(&mut self, block: &str) -> NormalizeResult<Vec<Value>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(block.as_bytes());

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            let Some(headers) = &self.headers else {
                self.headers = Some(row.iter().map(|h| h.trim().to_string()).collect());
                continue;
            };

            let mut record = Map::with_capacity(headers.len());
            for (i, header) in headers.iter().enumerate() {
                let value = row
                    .get(i)
                    .map(|cell| Value::String(cell.trim().to_string()))
                    .unwrap_or(Value::Null);
                record.insert(header.clone(), value);
            }
            records.push(Value::Object(record));
        }
        Ok(records)
    }

    async fn emit(&mut self, block: &str) -> NormalizeResult<()> {
        let records = self.parse_block(block)?;
        let writer = self.writer.as_mut().ok_or(NormalizeError::NotCreated)?;
        for record in &records {
            writer.write_record(record).await?;
        }
        Ok(())
    }
}

/// Byte offset just past the last newline that is outside a quoted field
fn last_row_boundary(text: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut boundary = None;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => boundary = Some(i + 1),
            _ => {}
        }
    }
    boundary
}

#[async_trait]
impl StreamHandler for CsvHandler {
    async fn create(&mut self) -> NormalizeResult<()> {
        let writer = JsonArrayWriter::create(self.storage.as_ref(), artifact_key("json")).await?;
        self.writer = Some(writer);
        Ok(())
    }

    async fn write(&mut self, chunk: &str) -> NormalizeResult<()> {
        match &self.writer {
            None => return Err(NormalizeError::NotCreated),
            Some(w) if !w.is_open() => return Err(NormalizeError::HandleClosed),
            Some(_) => {}
        }

        self.pending.push_str(chunk);
        let Some(end) = last_row_boundary(&self.pending) else {
            return Ok(());
        };
        let block: String = self.pending.drain(..end).collect();
        self.emit(&block).await
    }

    async fn finalize(&mut self) -> NormalizeResult<(String, usize)> {
        if !self.pending.trim().is_empty() {
            let block = std::mem::take(&mut self.pending);
            self.emit(&block).await?;
        }
        let writer = self.writer.as_mut().ok_or(NormalizeError::NotCreated)?;
        let count = writer.finish().await?;
        Ok((writer.path().to_string(), count))
    }

    fn artifact_paths(&self) -> Vec<String> {
        self.writer.iter().map(|w| w.path().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorageBackend;
    use serde_json::json;
    use tempfile::TempDir;

    async fn run(chunks: &[&str]) -> (Value, usize) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        let mut handler = CsvHandler::new(storage.clone());
        handler.create().await.unwrap();
        for chunk in chunks {
            handler.write(chunk).await.unwrap();
        }
        let (path, count) = handler.finalize().await.unwrap();
        let content = storage.read_file(&path).await.unwrap();
        (serde_json::from_slice(&content).unwrap(), count)
    }

    #[tokio::test]
    async fn test_header_and_rows() {
        let (records, count) = run(&["name,age\nAna,30\nLeo,25\n"]).await;
        assert_eq!(count, 2);
        assert_eq!(
            records,
            json!([{"name": "Ana", "age": "30"}, {"name": "Leo", "age": "25"}])
        );
    }

    #[tokio::test]
    async fn test_rows_split_across_chunks() {
        let (records, count) = run(&["na", "me,age\nAn", "a,30\nLeo", ",25"]).await;
        assert_eq!(count, 2);
        assert_eq!(records[0], json!({"name": "Ana", "age": "30"}));
        assert_eq!(records[1], json!({"name": "Leo", "age": "25"}));
    }

    #[tokio::test]
    async fn test_short_and_long_rows() {
        let (records, _) = run(&["a,b\n1\n2,3,4\n"]).await;
        assert_eq!(records, json!([{"a": "1", "b": null}, {"a": "2", "b": "3"}]));
    }

    #[tokio::test]
    async fn test_blank_lines_and_trimming() {
        let (records, _) = run(&["\n\n a , b \n\n x ,y\n"]).await;
        assert_eq!(records, json!([{"a": "x", "b": "y"}]));
    }

    #[tokio::test]
    async fn test_quoted_newline_kept_in_one_row() {
        let (records, count) = run(&["a,b\n\"line1\nline2\",2\n"]).await;
        assert_eq!(count, 1);
        assert_eq!(records[0]["a"], "line1\nline2");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (records, count) = run(&[]).await;
        assert_eq!(count, 0);
        assert_eq!(records, json!([]));
    }

    #[tokio::test]
    async fn test_write_before_create() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        let mut handler = CsvHandler::new(storage);
        assert!(matches!(
            handler.write("a\n").await,
            Err(NormalizeError::NotCreated)
        ));
    }

    #[test]
    fn test_row_boundary() {
        assert_eq!(last_row_boundary("a,b"), None);
        assert_eq!(last_row_boundary("a\nb\nc"), Some(4));
        assert_eq!(last_row_boundary("\"x\ny"), None);
    }
}
