//! Mapping compilation and application

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::{TransformError, TransformResult};
use super::expression::{Expression, record_context};
use super::shape::RecordShape;
use crate::store::{FieldMapping, Id, SourceMapping};

/// A mapping ready to run: parsed expressions plus the record validator
pub struct CompiledMapping {
    mapping_id: Option<Id>,
    expressions: Vec<Expression>,
    validator: Option<Validator>,
}

/// The part of a source schema that describes one record
///
/// An array schema validates its `items`; an empty or null schema disables
/// validation.
fn record_schema(schema: &Value) -> Option<&Value> {
    match schema {
        Value::Null => None,
        Value::Object(fields) if fields.is_empty() => None,
        Value::Object(fields) if fields.get("type") == Some(&Value::from("array")) => {
            fields.get("items")
        }
        other => Some(other),
    }
}

impl CompiledMapping {
    pub fn compile(mapping: &FieldMapping, source_schema: &Value) -> TransformResult<Self> {
        let expressions = mapping
            .iter()
            .map(|(field, source)| Expression::compile(field, source))
            .collect::<TransformResult<Vec<_>>>()?;

        let validator = record_schema(source_schema)
            .map(|schema| {
                Validator::new(schema).map_err(|e| TransformError::InvalidSchema(e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            mapping_id: None,
            expressions,
            validator,
        })
    }

    /// Compile a stored source mapping against its input schema
    pub fn from_source(source: &SourceMapping) -> TransformResult<Self> {
        let mapping = source
            .mapping
            .as_ref()
            .filter(|m| !m.is_empty())
            .ok_or(TransformError::MissingMapping(source.id))?;
        let mut compiled = Self::compile(mapping, &source.input_schema)?;
        compiled.mapping_id = Some(source.id);
        Ok(compiled)
    }

    pub fn mapping_id(&self) -> Option<Id> {
        self.mapping_id
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.expressions.iter().map(|e| e.field())
    }

    /// Check one record against the source schema
    pub fn validate(&self, record: &Value) -> TransformResult<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        validator.validate(record).map_err(|error| {
            let path = error.instance_path().to_string();
            TransformError::Validation {
                path: if path.is_empty() || path == "/" {
                    "root".to_string()
                } else {
                    path
                },
                message: error.to_string(),
            }
        })
    }

    /// Validate and map one record; output keys follow the mapping order
    pub fn apply_record(&self, record: &Value) -> TransformResult<Value> {
        self.validate(record)?;
        let fields = record.as_object().ok_or_else(|| {
            TransformError::UnsupportedShape("record is not an object".to_string())
        })?;
        let context = record_context(fields)?;

        let mut output = Map::with_capacity(self.expressions.len());
        for expression in &self.expressions {
            output.insert(expression.field().to_string(), expression.evaluate(&context)?);
        }
        Ok(Value::Object(output))
    }

    /// Map every record of a document, preserving its container shape
    ///
    /// The first failing record fails the whole call.
    pub fn apply(&self, document: &Value) -> TransformResult<Value> {
        match RecordShape::classify(document)? {
            RecordShape::Single => self.apply_record(document),
            RecordShape::List => {
                let items = document.as_array().map(Vec::as_slice).unwrap_or_default();
                items
                    .iter()
                    .map(|record| self.apply_record(record))
                    .collect::<TransformResult<Vec<_>>>()
                    .map(Value::Array)
            }
            RecordShape::KeyedMap => {
                let mut output = Map::new();
                if let Some(entries) = document.as_object() {
                    for (key, record) in entries {
                        output.insert(key.clone(), self.apply_record(record)?);
                    }
                }
                Ok(Value::Object(output))
            }
        }
    }
}

/// Compile and run one source mapping over a whole document
///
/// CPU bound; async callers run it on the blocking pool.
pub fn transform_document(source: &SourceMapping, document: &Value) -> TransformResult<Value> {
    CompiledMapping::from_source(source)?.apply(document)
}

/// Compiled mappings for one batch run, keyed by mapping id
///
/// Compile failures are cached too so a broken mapping is parsed only once.
#[derive(Default)]
pub struct MappingCache {
    compiled: HashMap<Id, Result<Arc<CompiledMapping>, TransformError>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&mut self, source: &SourceMapping) -> TransformResult<Arc<CompiledMapping>> {
        self.compiled
            .entry(source.id)
            .or_insert_with(|| CompiledMapping::from_source(source).map(Arc::new))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
}

/// Outcome for one input item of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,
    pub status: ItemStatus,
    /// One output per mapping, in mapping order
    pub result: Option<Vec<Value>>,
    pub error: Option<String>,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

/// Applies every mapping of an input definition to batch items
///
/// Failures stay inside their own [`ItemResult`]. One engine holds one
/// [`MappingCache`], so use a fresh engine per batch.
#[derive(Default)]
pub struct TransformEngine {
    cache: MappingCache,
}

impl TransformEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_item(&mut self, index: usize, item: &Value, mappings: &[SourceMapping]) -> ItemResult {
        let outcome = mappings
            .iter()
            .map(|source| self.cache.get_or_compile(source)?.apply(item))
            .collect::<TransformResult<Vec<_>>>();

        match outcome {
            Ok(outputs) => ItemResult {
                index,
                status: ItemStatus::Success,
                result: Some(outputs),
                error: None,
            },
            Err(e) => {
                debug!(index, error = %e, "Batch item failed");
                ItemResult {
                    index,
                    status: ItemStatus::Failed,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn apply_batch(&mut self, items: &[Value], mappings: &[SourceMapping]) -> Vec<ItemResult> {
        let results: Vec<ItemResult> = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.apply_item(index, item, mappings))
            .collect();

        debug!(
            items = results.len(),
            failed = results.iter().filter(|r| !r.is_success()).count(),
            mappings = mappings.len(),
            "Batch applied"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(id: Id, mapping: Option<FieldMapping>, input_schema: Value) -> SourceMapping {
        SourceMapping {
            id,
            input_definition_id: 1,
            name: format!("m{}", id),
            file_type: None,
            input_schema,
            output_schema: json!({}),
            mapping,
            model_id: None,
            target_path: None,
        }
    }

    fn full_name() -> FieldMapping {
        [("full", r#"first + " " + last"#), ("n", "1")].into_iter().collect()
    }

    #[test]
    fn test_shapes_preserved() {
        let compiled = CompiledMapping::compile(&full_name(), &json!({})).unwrap();

        let single = compiled.apply(&json!({"first": "A", "last": "B"})).unwrap();
        assert_eq!(single, json!({"full": "A B", "n": 1}));

        let list = compiled
            .apply(&json!([{"first": "A", "last": "B"}, {"first": "C", "last": "D"}]))
            .unwrap();
        assert_eq!(list.as_array().unwrap().len(), 2);

        let keyed = compiled
            .apply(&json!({"x": {"first": "A", "last": "B"}}))
            .unwrap();
        assert_eq!(keyed, json!({"x": {"full": "A B", "n": 1}}));
    }

    #[test]
    fn test_array_schema_validates_items() {
        let schema = json!({
            "type": "array",
            "items": {"type": "object", "required": ["first", "last"]}
        });
        let compiled = CompiledMapping::compile(&full_name(), &schema).unwrap();

        assert!(compiled.apply(&json!([{"first": "A", "last": "B"}])).is_ok());
        assert!(matches!(
            compiled.apply(&json!([{"first": "A"}])),
            Err(TransformError::Validation { .. })
        ));
    }

    #[test]
    fn test_missing_mapping() {
        assert_eq!(
            transform_document(&source(4, None, json!({})), &json!({})).unwrap_err(),
            TransformError::MissingMapping(4)
        );
        assert_eq!(
            transform_document(&source(5, Some(FieldMapping::new()), json!({})), &json!({}))
                .unwrap_err(),
            TransformError::MissingMapping(5)
        );
    }

    #[test]
    fn test_cache_compiles_once() {
        let mut cache = MappingCache::new();
        let mapping = source(1, Some(full_name()), json!({}));
        let a = cache.get_or_compile(&mapping).unwrap();
        let b = cache.get_or_compile(&mapping).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_batch_isolates_failures() {
        let schema = json!({"type": "object", "required": ["first", "last"]});
        let mappings = vec![source(1, Some(full_name()), schema)];
        let items = vec![
            json!({"first": "A", "last": "B"}),
            json!({"first": "only"}),
            json!({"first": "C", "last": "D"}),
        ];

        let results = TransformEngine::new().apply_batch(&items, &mappings);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert_eq!(results[1].status, ItemStatus::Failed);
        assert!(results[1].error.as_deref().unwrap().contains("Validation failed"));
        assert_eq!(
            results[2].result,
            Some(vec![json!({"full": "C D", "n": 1})])
        );
    }
}
