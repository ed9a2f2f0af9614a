//! Record transforms
//!
//! A [`SourceMapping`](crate::store::SourceMapping) carries one expression per
//! output field. [`CompiledMapping`] parses those expressions and the source
//! schema once; [`transform_document`] runs a mapping strictly over a whole
//! document, while [`TransformEngine::apply_batch`] keeps per-item failures
//! inside itemized results.
//!
//! # Example
//!
//! ```rust
//! use blueprint_engine::store::FieldMapping;
//! use blueprint_engine::transform::CompiledMapping;
//! use serde_json::json;
//!
//! let mapping: FieldMapping = [("name", "str::to_uppercase(user.name)")].into_iter().collect();
//! let compiled = CompiledMapping::compile(&mapping, &json!({})).unwrap();
//! let output = compiled.apply(&json!([{"user": {"name": "ada"}}])).unwrap();
//! assert_eq!(output, json!([{"name": "ADA"}]));
//! ```

mod engine;
mod error;
mod expression;
mod shape;

pub use engine::{
    CompiledMapping, ItemResult, ItemStatus, MappingCache, TransformEngine, transform_document,
};
pub use error::{TransformError, TransformResult};
pub use expression::{Expression, record_context};
pub use shape::RecordShape;
