//! In-memory record store
//!
//! Entities sit in flat [`Table`]s inside one [`Tables`] value guarded by a
//! single mutex. Every mutation runs inside [`RecordStore::transaction`], so a
//! closure that touches an execution and its job is applied as one unit and
//! no reader can observe a half-applied change.
//!
//! There is no rollback: closures check everything they need before the first
//! write. The lock is never held across an `.await`.

pub mod models;
mod table;

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use uuid::Uuid;

pub use models::*;
pub use table::Table;

/// Errors raised by the record store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Id },

    #[error("Failed to acquire store lock: {0}")]
    Poisoned(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// All entity tables
#[derive(Debug, Clone)]
pub struct Tables {
    pub blueprints: Table<Blueprint>,
    pub input_definitions: Table<InputDefinition>,
    pub output_definitions: Table<OutputDefinition>,
    pub source_mappings: Table<SourceMapping>,
    pub jobs: Table<MappingJob>,
    pub executions: Table<MappingExecution>,
    /// Highest version ever issued per version group
    pub version_heads: HashMap<Uuid, u32>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            blueprints: Table::new("blueprint"),
            input_definitions: Table::new("input definition"),
            output_definitions: Table::new("output definition"),
            source_mappings: Table::new("source mapping"),
            jobs: Table::new("mapping job"),
            executions: Table::new("mapping execution"),
            version_heads: HashMap::new(),
        }
    }
}

impl Tables {
    /// Mappings of an input definition in id order
    pub fn mappings_of(&self, input_definition_id: Id) -> Vec<&SourceMapping> {
        self.source_mappings
            .iter()
            .filter(|m| m.input_definition_id == input_definition_id)
            .collect()
    }

    /// Executions of a job in id order
    pub fn executions_of(&self, job_id: Id) -> Vec<&MappingExecution> {
        self.executions.iter().filter(|e| e.job_id == job_id).collect()
    }

    pub fn output_definition_of(&self, blueprint_id: Id) -> Option<&OutputDefinition> {
        self.output_definitions
            .find(|o| o.blueprint_id == blueprint_id)
    }

    pub fn job_by_uuid(&self, uuid: &Uuid) -> Option<&MappingJob> {
        self.jobs.find(|j| j.uuid == *uuid)
    }

    /// Members of a version group in version order
    pub fn version_group(&self, group: &Uuid) -> Vec<&InputDefinition> {
        let mut members: Vec<&InputDefinition> = self
            .input_definitions
            .iter()
            .filter(|d| d.version_group == *group)
            .collect();
        members.sort_by_key(|d| d.version);
        members
    }

    /// Reserve the next version number of a group
    pub fn next_version(&mut self, group: Uuid) -> u32 {
        let live = self
            .input_definitions
            .iter()
            .filter(|d| d.version_group == group)
            .map(|d| d.version)
            .max()
            .unwrap_or(0);
        let head = self.version_heads.entry(group).or_insert(0);
        *head = (*head).max(live) + 1;
        *head
    }
}

/// Shared handle over all tables
///
/// Construct one explicitly and pass it down (usually as `Arc<RecordStore>`).
#[derive(Debug, Default)]
pub struct RecordStore {
    tables: Mutex<Tables>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a read-only closure under the lock
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> StoreResult<R> {
        let tables = self
            .tables
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(f(&tables))
    }

    /// Run a mutating closure as one atomic unit
    pub fn transaction<R, E>(&self, f: impl FnOnce(&mut Tables) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut tables = self
            .tables
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&mut tables)
    }
}
