//! Infer command implementation

use std::path::Path;
use std::sync::Arc;

use blueprint_engine::{EngineConfig, FileSystemStorageBackend, SchemaExtractor};

use super::{load_input, resolve_content_type, scratch_dir};
use crate::error::CliError;
use crate::output::emit;

/// Handle the infer command
pub async fn handle_infer(
    config: &EngineConfig,
    input: &Path,
    content_type: Option<&str>,
    pretty: bool,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let content_type = resolve_content_type(input, content_type)?;
    let storage = Arc::new(FileSystemStorageBackend::new(scratch_dir(&config.upload_dir)?));
    let bytes = load_input(input)?;

    let schema = SchemaExtractor::new(storage, config)
        .extract_bytes(&content_type, &bytes)
        .await?;
    emit(&schema, pretty, output)
}
