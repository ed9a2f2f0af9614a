//! Record shape classification

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{TransformError, TransformResult};
use crate::inference::value_type_name;

/// How records are laid out inside a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordShape {
    /// One record
    Single,
    /// An array of records
    List,
    /// An object whose every value is a record, including `{}`
    KeyedMap,
}

impl RecordShape {
    pub fn classify(document: &Value) -> TransformResult<RecordShape> {
        match document {
            Value::Array(items) if items.iter().all(Value::is_object) => Ok(RecordShape::List),
            Value::Array(_) => Err(TransformError::UnsupportedShape(
                "array containing non-object items".to_string(),
            )),
            Value::Object(fields) if fields.values().all(Value::is_object) => {
                Ok(RecordShape::KeyedMap)
            }
            Value::Object(_) => Ok(RecordShape::Single),
            other => Err(TransformError::UnsupportedShape(
                value_type_name(other).to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify() {
        assert_eq!(
            RecordShape::classify(&json!([{"a": 1}, {}])).unwrap(),
            RecordShape::List
        );
        assert_eq!(RecordShape::classify(&json!([])).unwrap(), RecordShape::List);
        assert_eq!(
            RecordShape::classify(&json!({"x": {"a": 1}, "y": {}})).unwrap(),
            RecordShape::KeyedMap
        );
        assert_eq!(
            RecordShape::classify(&json!({"x": {"a": 1}, "y": 2})).unwrap(),
            RecordShape::Single
        );
        assert_eq!(RecordShape::classify(&json!({})).unwrap(), RecordShape::KeyedMap);
    }

    #[test]
    fn test_rejected_shapes() {
        assert!(matches!(
            RecordShape::classify(&json!([1, {"a": 1}])),
            Err(TransformError::UnsupportedShape(_))
        ));
        assert!(matches!(
            RecordShape::classify(&json!("text")),
            Err(TransformError::UnsupportedShape(_))
        ));
    }
}
