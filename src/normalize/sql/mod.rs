//! Relational dump handler
//!
//! The dump is buffered until finalize, rewritten for the detected dialect and
//! executed in an in-memory DuckDB database. Every table's rows are emitted
//! tagged with `_table`. When the engine fails or creates no tables, a
//! pattern-based parser extracts what it can from the original text.
//!
//! The first record is always a `_meta` record naming the detected dialect
//! and the processing method.

mod dialect;
mod engine;
mod fallback;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

pub use dialect::SqlDialect;
pub use fallback::{ColumnDef, TableDef, parse_create_tables, parse_inserts, parse_values};

use super::artifact_key;
use super::error::{NormalizeError, NormalizeResult};
use super::handler::StreamHandler;
use super::writer::JsonArrayWriter;
use crate::storage::StorageBackend;

pub const METHOD_ENGINE: &str = "duckdb_engine";
pub const METHOD_ENGINE_FAILED: &str = "duckdb_engine_failed";
pub const METHOD_PATTERN: &str = "regex_parser";

pub struct SqlHandler {
    storage: Arc<dyn StorageBackend>,
    writer: Option<JsonArrayWriter>,
    script: String,
}

impl SqlHandler {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            writer: None,
            script: String::new(),
        }
    }
}

fn meta(dialect: SqlDialect, method: &str) -> Value {
    json!({"_meta": {"original_dialect": dialect.as_str(), "processing_method": method}})
}

/// Convert a whole dump into records
pub async fn convert_script(script: &str) -> NormalizeResult<Vec<Value>> {
    let dialect = SqlDialect::detect(script);
    let rewritten = dialect.rewrite(script);

    let outcome = tokio::task::spawn_blocking(move || engine::load_rows(&rewritten))
        .await
        .map_err(|e| NormalizeError::Task(e.to_string()))?;

    let mut records = vec![meta(dialect, METHOD_ENGINE)];
    match outcome {
        Ok(output) if output.tables > 0 => {
            info!(
                dialect = %dialect,
                tables = output.tables,
                rows = output.rows.len(),
                "Loaded dump with embedded engine"
            );
            records.extend(output.rows);
            return Ok(records);
        }
        Ok(_) => {}
        Err(e) => {
            warn!(dialect = %dialect, error = %e, "Embedded engine rejected dump");
            records.push(json!({"_meta": {
                "error": format!("Engine processing error: {}", e),
                "original_dialect": dialect.as_str(),
                "processing_method": METHOD_ENGINE_FAILED,
            }}));
        }
    }

    records.push(meta(dialect, METHOD_PATTERN));
    records.extend(fallback::extract_records(script));
    Ok(records)
}

#[async_trait]
impl StreamHandler for SqlHandler {
    async fn create(&mut self) -> NormalizeResult<()> {
        self.writer =
            Some(JsonArrayWriter::create(self.storage.as_ref(), artifact_key("json")).await?);
        Ok(())
    }

    async fn write(&mut self, chunk: &str) -> NormalizeResult<()> {
        match &self.writer {
            None => Err(NormalizeError::NotCreated),
            Some(w) if !w.is_open() => Err(NormalizeError::HandleClosed),
            Some(_) => {
                self.script.push_str(chunk);
                Ok(())
            }
        }
    }

    async fn finalize(&mut self) -> NormalizeResult<(String, usize)> {
        let script = std::mem::take(&mut self.script)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let records = convert_script(&script).await?;
        let writer = self.writer.as_mut().ok_or(NormalizeError::NotCreated)?;
        for record in &records {
            writer.write_record(record).await?;
        }
        let count = writer.finish().await?;
        Ok((writer.path().to_string(), count))
    }

    fn artifact_paths(&self) -> Vec<String> {
        self.writer.iter().map(|w| w.path().to_string()).collect()
    }
}
