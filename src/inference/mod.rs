//! Schema inference for canonical record streams
//!
//! Produces a draft-07 JSON Schema from one record or a list of records:
//!
//! - **Type inference** - union-merged across records (integer widens to number)
//! - **Optionality** - a property is required only if every record has it
//! - **Examples** - up to `max_examples` distinct leaf values per structural
//!   path, first-seen order, where an array step is its own path component
//!
//! ## Example
//!
//! ```rust
//! use blueprint_engine::inference::{InferenceConfig, infer_schema};
//! use serde_json::json;
//!
//! let data = json!([{"name": "Ana"}, {"name": "Leo"}]);
//! let schema = infer_schema(&data, &InferenceConfig::default()).unwrap();
//! assert_eq!(schema["type"], "array");
//! assert_eq!(schema["items"]["properties"]["name"]["examples"], json!(["Ana", "Leo"]));
//! ```

mod config;
mod error;
mod inferrer;
mod types;

pub use config::{InferenceConfig, InferenceConfigBuilder};
pub use error::{InferenceError, InferenceResult};
pub use inferrer::{InferenceStats, SchemaInferrer, infer_schema};
pub(crate) use inferrer::value_type_name;
pub use types::{InferredField, InferredSchema, InferredType, JSON_SCHEMA_DRAFT7_URI};
