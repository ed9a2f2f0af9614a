//! Blueprints: input definitions, their versions, mappings and the target schema
//!
//! Every operation takes the resolved [`Caller`](crate::auth::Caller) and
//! checks access against the owning blueprint before touching the store.

mod error;
mod service;
pub mod versions;

pub use error::{BlueprintError, BlueprintResult};
pub use service::{
    BlueprintService, BlueprintUpdate, NewBlueprint, NewInputDefinition, NewSourceMapping,
    SourceMappingUpdate,
};
