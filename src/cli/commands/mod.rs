//! CLI command implementations

mod apply;
mod infer;
mod normalize;

use std::path::{Path, PathBuf};

pub use apply::handle_apply;
pub use infer::handle_infer;
pub use normalize::handle_normalize;

use blueprint_engine::Format;

use crate::error::CliError;

/// Load a file's raw bytes
fn load_input(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|e| CliError::FileReadError(path.to_path_buf(), e.to_string()))
}

/// Declared content type, or one derived from the file extension
fn resolve_content_type(path: &Path, declared: Option<&str>) -> Result<String, CliError> {
    if let Some(declared) = declared {
        return Ok(declared.to_string());
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let format = match extension.as_str() {
        "csv" => Format::Csv,
        "xml" => Format::Xml,
        "sql" => Format::Sql,
        "json" => Format::Json,
        _ => {
            return Err(CliError::InvalidArgument(format!(
                "Cannot tell the format of {}; pass --content-type",
                path.display()
            )));
        }
    };
    Ok(format.content_type().to_string())
}

/// Scratch directory for normalized artifacts
fn scratch_dir(upload_dir: &Path) -> Result<PathBuf, CliError> {
    std::fs::create_dir_all(upload_dir)
        .map_err(|e| CliError::FileWriteError(upload_dir.to_path_buf(), e.to_string()))?;
    Ok(upload_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_content_type() {
        assert_eq!(
            resolve_content_type(Path::new("orders.CSV"), None).unwrap(),
            "text/csv"
        );
        assert_eq!(
            resolve_content_type(Path::new("dump"), Some("text/sql")).unwrap(),
            "text/sql"
        );
        assert!(matches!(
            resolve_content_type(Path::new("notes.txt"), None),
            Err(CliError::InvalidArgument(_))
        ));
    }
}
