//! Persisted entities
//!
//! Every entity lives in its own flat table keyed by [`Id`]; relationships are
//! plain foreign-key ids resolved through the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Numeric row identifier, unique per table
pub type Id = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Uploaded files, run in the background
    Static,
    /// Single payloads, run synchronously and forwarded
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl MappingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MappingStatus::Success | MappingStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Pending => "PENDING",
            MappingStatus::Running => "RUNNING",
            MappingStatus::Success => "SUCCESS",
            MappingStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output field name to expression, in declaration order
///
/// Serialized as a JSON object whose values are expression strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct FieldMapping {
    rules: Vec<(String, String)>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the expression for `field`
    pub fn insert(&mut self, field: impl Into<String>, expression: impl Into<String>) {
        let field = field.into();
        let expression = expression.into();
        match self.rules.iter_mut().find(|(name, _)| *name == field) {
            Some(rule) => rule.1 = expression,
            None => self.rules.push((field, expression)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, expr)| expr.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(f, e)| (f.as_str(), e.as_str()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(f, _)| f.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<F: Into<String>, E: Into<String>> FromIterator<(F, E)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (F, E)>>(iter: I) -> Self {
        let mut mapping = FieldMapping::new();
        for (field, expression) in iter {
            mapping.insert(field, expression);
        }
        mapping
    }
}

impl TryFrom<Map<String, Value>> for FieldMapping {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut mapping = FieldMapping::new();
        for (field, value) in map {
            match value {
                Value::String(expr) => mapping.insert(field, expr),
                other => {
                    return Err(format!(
                        "expression for '{}' must be a string, got {}",
                        field, other
                    ));
                }
            }
        }
        Ok(mapping)
    }
}

impl From<FieldMapping> for Map<String, Value> {
    fn from(mapping: FieldMapping) -> Self {
        mapping
            .rules
            .into_iter()
            .map(|(field, expr)| (field, Value::String(expr)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub user_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One versioned input shape of a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDefinition {
    pub id: Id,
    pub blueprint_id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Shared by every version of this definition
    pub version_group: Uuid,
    pub version: u32,
    pub is_selected: bool,
    pub created_at: DateTime<Utc>,
}

/// Transform rules from one input shape to the output shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub id: Id,
    pub input_definition_id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub input_schema: Value,
    pub output_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<FieldMapping>,
    /// Model that generated `mapping`, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Key of this mapping's output in aggregate downloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub id: Id,
    pub blueprint_id: Id,
    pub json_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingJob {
    pub id: Id,
    /// Handle used by dynamic callers
    pub uuid: Uuid,
    pub name: String,
    pub job_type: JobType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_api_endpoint: Option<String>,
    pub status: MappingStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub user_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Id>,
    pub input_definition_id: Id,
}

/// One run of one mapping against one file or payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingExecution {
    pub id: Id,
    pub job_id: Id,
    pub source_mapping_id: Id,
    pub data_size_bytes: u64,
    pub status: MappingStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    /// Storage key of the normalized input (static)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_file_name: Option<String>,
    /// Storage key of the transformed output (static)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file_name: Option<String>,
    /// Inline payload (dynamic)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_mapping_keeps_declaration_order() {
        let mapping: FieldMapping =
            serde_json::from_value(json!({"z": "a", "m": "b", "a": "c"})).unwrap();
        assert_eq!(mapping.fields().collect::<Vec<_>>(), vec!["z", "m", "a"]);
        assert_eq!(
            serde_json::to_string(&mapping).unwrap(),
            r#"{"z":"a","m":"b","a":"c"}"#
        );
    }

    #[test]
    fn test_field_mapping_rejects_non_string() {
        let result: Result<FieldMapping, _> = serde_json::from_value(json!({"a": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_value(MappingStatus::Success).unwrap(), json!("SUCCESS"));
        assert_eq!(serde_json::to_value(JobType::Dynamic).unwrap(), json!("DYNAMIC"));
        assert!(MappingStatus::Failed.is_terminal());
        assert!(!MappingStatus::Running.is_terminal());
    }
}
