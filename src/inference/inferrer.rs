//! Schema inference engine

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::config::InferenceConfig;
use super::error::{InferenceError, InferenceResult};
use super::types::{ARRAY_STEP, InferredField, InferredSchema, InferredType};

/// Statistics from schema inference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceStats {
    /// Total records processed
    pub records_processed: usize,
    /// Distinct leaf paths with collected examples
    pub leaf_paths: usize,
    /// Maximum nesting depth encountered
    pub max_depth: usize,
}

/// Schema inference engine
///
/// Feed records with [`add_value`](Self::add_value); every record's type is
/// union-merged into one root type while leaf examples are collected per path.
pub struct SchemaInferrer {
    config: InferenceConfig,
    root: InferredType,
    /// Example values per leaf path, first-seen order
    examples: HashMap<String, Vec<Value>>,
    record_count: usize,
    max_depth_seen: usize,
}

impl SchemaInferrer {
    /// Create a new schema inferrer with default configuration
    pub fn new() -> Self {
        Self::with_config(InferenceConfig::default())
    }

    /// Create a new schema inferrer with custom configuration
    pub fn with_config(config: InferenceConfig) -> Self {
        Self {
            config,
            root: InferredType::Unknown,
            examples: HashMap::new(),
            record_count: 0,
            max_depth_seen: 0,
        }
    }

    /// Parse and add a single JSON record
    pub fn add_json(&mut self, json: &str) -> InferenceResult<()> {
        let value: Value = serde_json::from_str(json)?;
        self.add_value(&value)
    }

    /// Add a parsed record; the record must be an object
    pub fn add_value(&mut self, value: &Value) -> InferenceResult<()> {
        if !value.is_object() {
            return Err(InferenceError::InvalidStructure(
                value_type_name(value).to_string(),
            ));
        }

        let inferred = self.infer_type(value, "$", 0)?;
        let root = std::mem::replace(&mut self.root, InferredType::Unknown);
        self.root = root.merge_with(inferred);
        self.record_count += 1;

        Ok(())
    }

    fn infer_type(&mut self, value: &Value, path: &str, depth: usize) -> InferenceResult<InferredType> {
        if depth > self.config.max_depth {
            return Err(InferenceError::MaxDepthExceeded {
                depth,
                max: self.config.max_depth,
            });
        }
        self.max_depth_seen = self.max_depth_seen.max(depth);

        match value {
            Value::Array(items) => {
                let item_path = format!("{}{}", path, ARRAY_STEP);
                let mut item_type = InferredType::Unknown;
                for item in items {
                    let t = self.infer_type(item, &item_path, depth + 1)?;
                    item_type = item_type.merge_with(t);
                }
                Ok(InferredType::Array {
                    items: Box::new(item_type),
                    nullable_items: items.iter().any(Value::is_null),
                })
            }
            Value::Object(fields) => {
                let mut properties = BTreeMap::new();
                for (key, val) in fields {
                    let field_path = format!("{}.{}", path, key);
                    let field_type = self.infer_type(val, &field_path, depth + 1)?;
                    properties.insert(
                        key.clone(),
                        InferredField::new(field_type).with_nullable(val.is_null()),
                    );
                }
                Ok(InferredType::Object { properties })
            }
            scalar => {
                self.collect_example(path, scalar);
                Ok(match scalar {
                    Value::Null => InferredType::Null,
                    Value::Bool(_) => InferredType::Boolean,
                    Value::Number(n) if n.is_i64() || n.is_u64() => InferredType::Integer,
                    Value::Number(_) => InferredType::Number,
                    _ => InferredType::String,
                })
            }
        }
    }

    fn collect_example(&mut self, path: &str, value: &Value) {
        if !self.config.collect_examples {
            return;
        }
        let bucket = self.examples.entry(path.to_string()).or_default();
        if bucket.len() < self.config.max_examples && !bucket.contains(value) {
            bucket.push(value.clone());
        }
    }

    /// Finalize inference for a single-record document
    pub fn finalize(self) -> InferredSchema {
        self.build(false)
    }

    /// Finalize inference for a list of records
    pub fn finalize_collection(self) -> InferredSchema {
        self.build(true)
    }

    fn build(self, collection: bool) -> InferredSchema {
        debug!(
            records = self.record_count,
            leaf_paths = self.examples.len(),
            "Schema inference complete"
        );
        InferredSchema {
            root: self.root,
            record_count: self.record_count,
            collection,
            examples: self.examples,
        }
    }

    /// Get current inference statistics
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            records_processed: self.record_count,
            leaf_paths: self.examples.len(),
            max_depth: self.max_depth_seen,
        }
    }

    /// Get the number of records processed
    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

impl Default for SchemaInferrer {
    fn default() -> Self {
        Self::new()
    }
}

/// Infer a JSON Schema document from one record or a list of records
///
/// A document that already carries `$schema` is returned unchanged.
pub fn infer_schema(document: &Value, config: &InferenceConfig) -> InferenceResult<Value> {
    match document {
        Value::Array(records) => {
            let mut inferrer = SchemaInferrer::with_config(config.clone());
            for record in records {
                if !record.is_object() {
                    return Err(InferenceError::InvalidStructure(format!(
                        "list containing {}",
                        value_type_name(record)
                    )));
                }
                inferrer.add_value(record)?;
            }
            Ok(inferrer.finalize_collection().to_json_schema())
        }
        Value::Object(fields) => {
            if fields.get("$schema").is_some_and(|marker| !marker.is_null()) {
                return Ok(document.clone());
            }
            let mut inferrer = SchemaInferrer::with_config(config.clone());
            inferrer.add_value(document)?;
            Ok(inferrer.finalize().to_json_schema())
        }
        other => Err(InferenceError::InvalidStructure(
            value_type_name(other).to_string(),
        )),
    }
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
