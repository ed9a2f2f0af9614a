//! Type inference for JSON values

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// JSON Schema draft used for generated documents
pub const JSON_SCHEMA_DRAFT7_URI: &str = "http://json-schema.org/draft-07/schema#";

/// Path component for a step through an array
pub(crate) const ARRAY_STEP: &str = "[]";

/// Inferred JSON type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InferredType {
    /// Null type
    Null,
    /// Boolean type
    Boolean,
    /// Integer type (whole numbers)
    Integer,
    /// Number type (floating point)
    Number,
    /// String type
    String,
    /// Array type with item type
    Array {
        items: Box<InferredType>,
        /// Some observed item was `null`
        #[serde(default)]
        nullable_items: bool,
    },
    /// Object type with properties
    Object {
        properties: BTreeMap<String, InferredField>,
    },
    /// Mixed types
    Mixed { types: Vec<InferredType> },
    /// Unknown (no samples, e.g. items of an empty array)
    Unknown,
}

impl InferredType {
    /// Get the JSON Schema type name
    pub fn type_name(&self) -> &'static str {
        match self {
            InferredType::Null => "null",
            InferredType::Boolean => "boolean",
            InferredType::Integer => "integer",
            InferredType::Number => "number",
            InferredType::String => "string",
            InferredType::Array { .. } => "array",
            InferredType::Object { .. } => "object",
            InferredType::Mixed { .. } => "mixed",
            InferredType::Unknown => "unknown",
        }
    }

    /// True for types that carry no nested structure
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            InferredType::Null
                | InferredType::Boolean
                | InferredType::Integer
                | InferredType::Number
                | InferredType::String
        )
    }

    /// Merge this type with another type
    pub fn merge_with(self, other: InferredType) -> InferredType {
        if self == other {
            return self;
        }

        match (self, other) {
            // Unknown + anything = anything
            (InferredType::Unknown, other) | (other, InferredType::Unknown) => other,

            // Null + X = X; nullability is tracked on the field
            (InferredType::Null, other) | (other, InferredType::Null) => other,

            // Integer + Number = Number
            (InferredType::Integer, InferredType::Number)
            | (InferredType::Number, InferredType::Integer) => InferredType::Number,

            (
                InferredType::Array {
                    items: a,
                    nullable_items: na,
                },
                InferredType::Array {
                    items: b,
                    nullable_items: nb,
                },
            ) => InferredType::Array {
                items: Box::new((*a).merge_with(*b)),
                nullable_items: na || nb,
            },

            (
                InferredType::Object { properties: mut p1 },
                InferredType::Object { properties: mut p2 },
            ) => {
                for (key, field1) in p1.iter_mut() {
                    match p2.remove(key) {
                        Some(field2) => *field1 = field1.clone().merge_with(field2),
                        None => field1.required = false,
                    }
                }
                for (key, mut field2) in p2 {
                    field2.required = false;
                    p1.insert(key, field2);
                }
                InferredType::Object { properties: p1 }
            }

            (InferredType::Mixed { types }, other) | (other, InferredType::Mixed { types }) => {
                let mut merged = types;
                absorb_into(&mut merged, other);
                InferredType::Mixed { types: merged }
            }

            // Different kinds become Mixed
            (a, b) => InferredType::Mixed { types: vec![a, b] },
        }
    }
}

/// Fold `incoming` into a mixed type list, merging with a compatible member
fn absorb_into(types: &mut Vec<InferredType>, incoming: InferredType) {
    let incoming = match incoming {
        InferredType::Mixed { types: nested } => {
            for t in nested {
                absorb_into(types, t);
            }
            return;
        }
        InferredType::Null | InferredType::Unknown => return,
        other => other,
    };

    let compatible = types.iter().position(|existing| {
        existing == &incoming
            || matches!(
                (existing, &incoming),
                (InferredType::Integer, InferredType::Number)
                    | (InferredType::Number, InferredType::Integer)
                    | (InferredType::Array { .. }, InferredType::Array { .. })
                    | (InferredType::Object { .. }, InferredType::Object { .. })
            )
    });

    match compatible {
        Some(idx) => {
            let existing = types.remove(idx);
            types.insert(idx, existing.merge_with(incoming));
        }
        None => types.push(incoming),
    }
}

fn container_type(name: &str, nullable: bool) -> Value {
    if nullable {
        json!([name, "null"])
    } else {
        json!(name)
    }
}

/// An inferred field in a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredField {
    /// The inferred type of this field
    pub field_type: InferredType,
    /// Whether this field is present in every observed object
    pub required: bool,
    /// Whether this field was ever null
    pub nullable: bool,
    /// Number of occurrences
    pub occurrences: usize,
}

impl InferredField {
    /// Create a new inferred field
    pub fn new(field_type: InferredType) -> Self {
        Self {
            field_type,
            required: true,
            nullable: false,
            occurrences: 1,
        }
    }

    /// Mark this field as nullable
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark this field as optional
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Merge with another observation of the same field
    pub fn merge_with(self, other: InferredField) -> InferredField {
        InferredField {
            field_type: self.field_type.merge_with(other.field_type),
            required: self.required && other.required,
            nullable: self.nullable || other.nullable,
            occurrences: self.occurrences + other.occurrences,
        }
    }
}

/// Complete inferred schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredSchema {
    /// Merged record type
    pub root: InferredType,
    /// Number of records analyzed
    pub record_count: usize,
    /// Whether the input was a list of records
    pub collection: bool,
    /// Example values keyed by structural path (`$.a`, `$.a[].b`)
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub examples: HashMap<String, Vec<Value>>,
}

impl InferredSchema {
    /// Convert to a draft-07 JSON Schema document with leaf examples
    pub fn to_json_schema(&self) -> Value {
        let body = self.type_to_json_schema(&self.root, "$", false);

        if !self.collection {
            let mut schema = Map::new();
            schema.insert("$schema".to_string(), json!(JSON_SCHEMA_DRAFT7_URI));
            if let Value::Object(fields) = body {
                schema.extend(fields);
            }
            return Value::Object(schema);
        }

        json!({
            "type": "array",
            "$schema": JSON_SCHEMA_DRAFT7_URI,
            "items": body,
        })
    }

    fn type_to_json_schema(&self, inferred: &InferredType, path: &str, nullable: bool) -> Value {
        match inferred {
            InferredType::Unknown => json!({}),
            InferredType::Array {
                items,
                nullable_items,
            } => {
                let item_path = format!("{}{}", path, ARRAY_STEP);
                json!({
                    "type": container_type("array", nullable),
                    "items": self.type_to_json_schema(items, &item_path, *nullable_items),
                })
            }
            InferredType::Object { properties } => {
                let mut props = Map::new();
                let mut required = Vec::new();

                for (name, field) in properties {
                    let field_path = format!("{}.{}", path, name);
                    props.insert(
                        name.clone(),
                        self.type_to_json_schema(&field.field_type, &field_path, field.nullable),
                    );
                    if field.required {
                        required.push(Value::String(name.clone()));
                    }
                }

                let mut schema = json!({
                    "type": container_type("object", nullable),
                    "properties": props,
                });
                if !required.is_empty() {
                    schema["required"] = Value::Array(required);
                }
                schema
            }
            InferredType::Mixed { types } => {
                let (scalars, containers): (Vec<_>, Vec<_>) =
                    types.iter().partition(|t| t.is_scalar());

                let scalar_branch =
                    (!scalars.is_empty()).then(|| self.scalar_schema(&scalars, path, nullable));

                if containers.is_empty() {
                    return scalar_branch.unwrap_or_else(|| json!({}));
                }

                let mut any_of: Vec<Value> = containers
                    .into_iter()
                    .map(|t| self.type_to_json_schema(t, path, false))
                    .collect();
                if let Some(branch) = scalar_branch {
                    any_of.push(branch);
                } else if nullable {
                    any_of.push(json!({ "type": "null" }));
                }
                json!({ "anyOf": any_of })
            }
            scalar => self.scalar_schema(&[scalar], path, nullable),
        }
    }

    fn scalar_schema(&self, types: &[&InferredType], path: &str, nullable: bool) -> Value {
        let mut names: Vec<&str> = types.iter().map(|t| t.type_name()).collect();
        if nullable && !names.contains(&"null") {
            names.push("null");
        }

        let mut schema = if names.len() == 1 {
            json!({ "type": names[0] })
        } else {
            json!({ "type": names })
        };

        if let Some(examples) = self.examples.get(path).filter(|e| !e.is_empty()) {
            schema["examples"] = Value::Array(examples.clone());
        }
        schema
    }
}
