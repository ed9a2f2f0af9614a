//! Normalize command implementation

use std::path::Path;
use std::sync::Arc;

use blueprint_engine::{EngineConfig, FileSystemStorageBackend, NormalizeError, Normalizer, StorageBackend};
use serde_json::Value;
use tracing::info;

use super::{resolve_content_type, scratch_dir};
use crate::error::CliError;
use crate::output::emit;

/// Handle the normalize command
pub async fn handle_normalize(
    config: &EngineConfig,
    input: &Path,
    content_type: Option<&str>,
    pretty: bool,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let content_type = resolve_content_type(input, content_type)?;
    let storage: Arc<dyn StorageBackend> =
        Arc::new(FileSystemStorageBackend::new(scratch_dir(&config.upload_dir)?));
    let normalizer = Normalizer::new(storage.clone(), config);

    let size = tokio::fs::metadata(input)
        .await
        .map_err(|e| CliError::FileReadError(input.to_path_buf(), e.to_string()))?
        .len();
    normalizer.check(&content_type, size)?;

    let file = tokio::fs::File::open(input)
        .await
        .map_err(|e| CliError::FileReadError(input.to_path_buf(), e.to_string()))?;
    let mut handler = normalizer.process(&content_type, file).await?;

    let result = async {
        let normalized = handler.output().cloned().ok_or(NormalizeError::NotFinalized)?;
        let content = storage
            .read_file(&normalized.path)
            .await
            .map_err(NormalizeError::from)?;
        let records: Value = serde_json::from_slice(&content)?;
        info!(format = %normalized.format, count = normalized.count, "Normalized");
        emit(&records, pretty, output)
    }
    .await;

    handler.discard().await;
    result
}
