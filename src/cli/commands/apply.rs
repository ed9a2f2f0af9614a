//! Apply command implementation

use std::path::Path;

use blueprint_engine::store::FieldMapping;
use blueprint_engine::transform::CompiledMapping;
use serde_json::Value;
use tracing::debug;

use super::load_input;
use crate::error::CliError;
use crate::output::emit;

/// Handle the apply command
///
/// `input` is a JSON record or record list, `mapping` a JSON object of output
/// field to expression, `schema` an optional JSON Schema records must match.
pub fn handle_apply(
    input: &Path,
    mapping: &Path,
    schema: Option<&Path>,
    pretty: bool,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let document: Value = serde_json::from_slice(&load_input(input)?)?;
    let mapping: FieldMapping = serde_json::from_slice(&load_input(mapping)?)?;
    let schema: Value = match schema {
        Some(path) => serde_json::from_slice(&load_input(path)?)?,
        None => Value::Null,
    };

    let compiled = CompiledMapping::compile(&mapping, &schema)?;
    debug!(fields = mapping.len(), "Mapping compiled");
    let result = compiled.apply(&document)?;
    emit(&result, pretty, output)
}
