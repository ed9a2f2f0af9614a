//! Output formatting for CLI

use std::path::Path;

use serde_json::Value;

use crate::error::CliError;

/// Render JSON compactly or pretty-printed
pub fn render(value: &Value, pretty: bool) -> Result<String, CliError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

/// Write to `output` when given, otherwise to stdout
pub fn emit(value: &Value, pretty: bool, output: Option<&Path>) -> Result<(), CliError> {
    let text = render(value, pretty)?;
    match output {
        Some(path) => std::fs::write(path, text + "\n")
            .map_err(|e| CliError::FileWriteError(path.to_path_buf(), e.to_string())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_modes() {
        let value = json!({"a": [1, 2]});
        assert_eq!(render(&value, false).unwrap(), r#"{"a":[1,2]}"#);
        assert!(render(&value, true).unwrap().contains("\n  \"a\""));
    }
}
