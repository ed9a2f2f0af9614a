//! Job and execution operations

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::endpoint::EndpointClient;
use super::error::{JobError, JobResult};
use super::lifecycle;
use super::worker::{ExecutionQueue, ExecutionRunner};
use crate::auth::Caller;
use crate::config::EngineConfig;
use crate::normalize::{NormalizeError, Normalizer};
use crate::storage::{StorageBackend, StorageError};
use crate::store::{
    Id, JobType, MappingExecution, MappingJob, MappingStatus, RecordStore, SourceMapping, Tables,
};
use crate::transform::transform_document;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub job_type: JobType,
    #[serde(default)]
    pub external_api_endpoint: Option<String>,
    pub input_definition_id: Id,
}

/// Partial update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub job_type: Option<JobType>,
    pub external_api_endpoint: Option<String>,
}

/// One uploaded file for a static execution
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

pub(super) fn authorize_job<'t>(tables: &'t Tables, caller: &Caller, id: Id) -> JobResult<&'t MappingJob> {
    let job = tables.jobs.require(id)?;
    if caller.can_access(job.user_id, job.organization_id) {
        Ok(job)
    } else {
        Err(JobError::Unauthorized {
            entity: "mapping job",
            id,
        })
    }
}

/// Mapping `source_mapping_id` if it belongs to the job's input definition
fn job_mapping<'t>(
    tables: &'t Tables,
    job: &MappingJob,
    source_mapping_id: Id,
) -> JobResult<&'t SourceMapping> {
    tables
        .source_mappings
        .get(source_mapping_id)
        .filter(|m| m.input_definition_id == job.input_definition_id)
        .ok_or(JobError::ForeignMapping {
            job_id: job.id,
            source_mapping_id,
        })
}

fn completed_since(execution: &MappingExecution, since_days: Option<i64>) -> bool {
    match since_days {
        None => true,
        Some(days) => execution
            .completed_at
            .is_some_and(|at| at >= Utc::now() - Duration::days(days)),
    }
}

/// Creates jobs, accepts uploads and payloads, and tracks executions
///
/// Static executions run on the background [`ExecutionQueue`]; dynamic
/// payloads are evaluated while the caller waits.
pub struct JobService {
    pub(super) store: Arc<RecordStore>,
    pub(super) storage: Arc<dyn StorageBackend>,
    pub(super) config: EngineConfig,
    normalizer: Normalizer,
    endpoints: Arc<dyn EndpointClient>,
    queue: ExecutionQueue,
}

impl JobService {
    /// Build the service and start its execution worker
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        store: Arc<RecordStore>,
        storage: Arc<dyn StorageBackend>,
        endpoints: Arc<dyn EndpointClient>,
        config: EngineConfig,
    ) -> Self {
        let normalizer = Normalizer::new(storage.clone(), &config);
        let queue = ExecutionQueue::start(ExecutionRunner::new(store.clone(), storage.clone()));
        Self {
            store,
            storage,
            config,
            normalizer,
            endpoints,
            queue,
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    /// Stop the worker after queued executions have finished
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    async fn check_endpoint(&self, job_type: JobType, endpoint: Option<&str>) -> JobResult<()> {
        if job_type != JobType::Dynamic {
            return Ok(());
        }
        let endpoint = endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or(JobError::MissingEndpoint)?;
        self.endpoints.probe(endpoint).await?;
        debug!(endpoint, "Endpoint reachable");
        Ok(())
    }

    // Jobs

    pub async fn create_job(&self, caller: &Caller, new: NewJob) -> JobResult<MappingJob> {
        if new.name.trim().is_empty() {
            return Err(JobError::InvalidInput("name must not be empty".to_string()));
        }
        let organization_id = self.store.read(|t| -> JobResult<Option<Id>> {
            let definition = t.input_definitions.require(new.input_definition_id)?;
            let blueprint = t.blueprints.require(definition.blueprint_id)?;
            if !caller.can_access(blueprint.user_id, blueprint.organization_id) {
                return Err(JobError::Unauthorized {
                    entity: "blueprint",
                    id: blueprint.id,
                });
            }
            Ok(blueprint.organization_id)
        })??;

        self.check_endpoint(new.job_type, new.external_api_endpoint.as_deref())
            .await?;

        let job = self.store.transaction(|t| {
            t.input_definitions.require(new.input_definition_id)?;
            Ok::<_, JobError>(
                t.jobs
                    .insert_with(|id| MappingJob {
                        id,
                        uuid: Uuid::new_v4(),
                        name: new.name,
                        job_type: new.job_type,
                        external_api_endpoint: new.external_api_endpoint,
                        status: MappingStatus::Pending,
                        created_at: Utc::now(),
                        started_at: None,
                        completed_at: None,
                        user_id: caller.id,
                        organization_id,
                        input_definition_id: new.input_definition_id,
                    })
                    .clone(),
            )
        })?;
        info!(job_id = job.id, job_type = ?job.job_type, "Created mapping job");
        Ok(job)
    }

    pub fn get_job(&self, caller: &Caller, id: Id) -> JobResult<MappingJob> {
        self.store.read(|t| authorize_job(t, caller, id).cloned())?
    }

    /// Every job the caller can access
    pub fn list_jobs(&self, caller: &Caller) -> JobResult<Vec<MappingJob>> {
        Ok(self.store.read(|t| {
            t.jobs
                .iter()
                .filter(|j| caller.can_access(j.user_id, j.organization_id))
                .cloned()
                .collect()
        })?)
    }

    pub fn list_user_jobs(&self, caller: &Caller, user_id: Id) -> JobResult<Vec<MappingJob>> {
        if !caller.is_admin && caller.id != user_id {
            return Err(JobError::Unauthorized {
                entity: "user",
                id: user_id,
            });
        }
        Ok(self.store.read(|t| {
            t.jobs
                .iter()
                .filter(|j| j.user_id == user_id)
                .cloned()
                .collect()
        })?)
    }

    pub fn list_organization_jobs(
        &self,
        caller: &Caller,
        organization_id: Id,
    ) -> JobResult<Vec<MappingJob>> {
        if !caller.is_admin && !caller.is_member_of(organization_id) {
            return Err(JobError::Unauthorized {
                entity: "organization",
                id: organization_id,
            });
        }
        Ok(self.store.read(|t| {
            t.jobs
                .iter()
                .filter(|j| j.organization_id == Some(organization_id))
                .cloned()
                .collect()
        })?)
    }

    /// Update a job; a resulting dynamic job is re-probed before anything is written
    pub async fn update_job(&self, caller: &Caller, id: Id, update: JobUpdate) -> JobResult<MappingJob> {
        let current = self.get_job(caller, id)?;
        let job_type = update.job_type.unwrap_or(current.job_type);
        let endpoint = update
            .external_api_endpoint
            .as_deref()
            .or(current.external_api_endpoint.as_deref());
        self.check_endpoint(job_type, endpoint).await?;

        self.store.transaction(|t| {
            let job = t.jobs.require_mut(id)?;
            if let Some(name) = update.name {
                job.name = name;
            }
            job.job_type = job_type;
            if update.external_api_endpoint.is_some() {
                job.external_api_endpoint = update.external_api_endpoint;
            }
            Ok(job.clone())
        })
    }

    /// Administrative status override
    pub fn set_job_status(&self, caller: &Caller, id: Id, status: MappingStatus) -> JobResult<MappingJob> {
        self.store.transaction(|t| {
            authorize_job(t, caller, id)?;
            let job = t.jobs.require_mut(id)?;
            job.status = status;
            info!(job_id = id, %status, "Job status set");
            Ok(job.clone())
        })
    }

    /// Delete a job with its executions and their artifacts
    pub async fn delete_job(&self, caller: &Caller, id: Id) -> JobResult<()> {
        let removed = self.store.transaction(|t| {
            authorize_job(t, caller, id)?;
            let executions: Vec<MappingExecution> =
                t.executions_of(id).into_iter().cloned().collect();
            t.executions.remove_where(|e| e.job_id == id);
            t.jobs.remove(id);
            Ok::<_, JobError>(executions)
        })?;
        info!(job_id = id, executions = removed.len(), "Deleted mapping job");
        for execution in &removed {
            self.remove_artifacts(execution).await;
        }
        Ok(())
    }

    async fn remove_artifacts(&self, execution: &MappingExecution) {
        let paths = [&execution.input_file_name, &execution.output_file_name];
        for path in paths.into_iter().flatten() {
            match self.storage.delete_file(path).await {
                Ok(()) | Err(StorageError::FileNotFound(_)) => {}
                Err(e) => warn!(path = %path, error = %e, "Failed to remove execution artifact"),
            }
        }
    }

    // Static executions

    /// Normalize an upload and queue it against one mapping of a static job
    ///
    /// A second upload for the same mapping overwrites the existing execution
    /// in place and resets the job to `PENDING`.
    pub async fn submit_execution(
        &self,
        caller: &Caller,
        job_id: Id,
        source_mapping_id: Id,
        upload: Upload<'_>,
    ) -> JobResult<MappingExecution> {
        self.store.read(|t| -> JobResult<()> {
            let job = authorize_job(t, caller, job_id)?;
            if job.job_type != JobType::Static {
                return Err(JobError::WrongJobType {
                    job_id,
                    expected: JobType::Static,
                    actual: job.job_type,
                });
            }
            job_mapping(t, job, source_mapping_id)?;
            Ok(())
        })??;
        self.normalizer
            .check(upload.content_type, upload.bytes.len() as u64)?;

        let span = info_span!("submit", job_id, source_mapping_id);
        let mut handler = self
            .normalizer
            .process(upload.content_type, upload.bytes)
            .instrument(span)
            .await?;
        let input = handler
            .output()
            .cloned()
            .ok_or(NormalizeError::NotFinalized)?;

        let upserted = self.store.transaction(|t| {
            t.jobs.require(job_id)?;
            let existing = t
                .executions
                .find(|e| e.job_id == job_id && e.source_mapping_id == source_mapping_id)
                .map(|e| e.id);
            let (execution, replaced) = match existing {
                Some(id) => {
                    let row = t.executions.require_mut(id)?;
                    let replaced = row.clone();
                    row.data_size_bytes = upload.bytes.len() as u64;
                    row.status = MappingStatus::Pending;
                    row.started_at = None;
                    row.completed_at = None;
                    row.error_message = None;
                    row.output_file_name = None;
                    row.json_data = None;
                    row.original_file_name = Some(upload.file_name.to_string());
                    row.input_file_name = Some(input.path.clone());
                    (row.clone(), Some(replaced))
                }
                None => {
                    let row = t.executions.insert_with(|id| MappingExecution {
                        id,
                        job_id,
                        source_mapping_id,
                        data_size_bytes: upload.bytes.len() as u64,
                        status: MappingStatus::Pending,
                        attempts: 0,
                        created_at: Utc::now(),
                        started_at: None,
                        completed_at: None,
                        original_file_name: Some(upload.file_name.to_string()),
                        input_file_name: Some(input.path.clone()),
                        output_file_name: None,
                        json_data: None,
                        error_message: None,
                    });
                    (row.clone(), None)
                }
            };
            let sibling_failed = t
                .executions_of(job_id)
                .iter()
                .any(|e| e.id != execution.id && e.status == MappingStatus::Failed);
            let job = t.jobs.require_mut(job_id)?;
            if sibling_failed {
                job.status = MappingStatus::Failed;
            } else {
                if replaced.is_some() || job.status != MappingStatus::Running {
                    job.status = MappingStatus::Pending;
                }
                job.completed_at = None;
            }
            Ok::<_, JobError>((execution, replaced))
        });

        let (execution, replaced) = match upserted {
            Ok(upserted) => upserted,
            Err(e) => {
                handler.discard().await;
                return Err(e);
            }
        };
        if let Some(previous) = &replaced {
            self.remove_artifacts(previous).await;
        }
        info!(
            execution_id = execution.id,
            job_id,
            records = input.count,
            replaced = replaced.is_some(),
            "Execution submitted"
        );

        if let Err(e) = self.queue.enqueue(execution.id) {
            lifecycle::fail(&self.store, execution.id, e.to_string())?;
            return Err(e);
        }
        Ok(execution)
    }

    // Dynamic executions

    /// Map one payload synchronously and optionally forward the result
    ///
    /// Size, job and mapping are checked before an execution row exists. Any
    /// later failure marks that execution failed and is returned.
    pub async fn handle_dynamic(
        &self,
        job_uuid: Uuid,
        source_mapping_id: Id,
        payload: Value,
        forward: bool,
    ) -> JobResult<Value> {
        let size = serde_json::to_vec(&payload)?.len() as u64;
        if size > self.config.max_dynamic_payload_bytes {
            return Err(JobError::PayloadTooLarge {
                size,
                max: self.config.max_dynamic_payload_bytes,
            });
        }

        let (job, mapping) = self.store.read(|t| -> JobResult<(MappingJob, SourceMapping)> {
            let job = t
                .job_by_uuid(&job_uuid)
                .ok_or(JobError::UnknownJob(job_uuid))?;
            if job.job_type != JobType::Dynamic {
                return Err(JobError::WrongJobType {
                    job_id: job.id,
                    expected: JobType::Dynamic,
                    actual: job.job_type,
                });
            }
            let mapping = job_mapping(t, job, source_mapping_id)?;
            Ok((job.clone(), mapping.clone()))
        })??;

        let execution_id = self.store.transaction(|t| {
            t.jobs.require(job.id)?;
            Ok::<_, JobError>(
                t.executions
                    .insert_with(|id| MappingExecution {
                        id,
                        job_id: job.id,
                        source_mapping_id,
                        data_size_bytes: size,
                        status: MappingStatus::Pending,
                        attempts: 0,
                        created_at: Utc::now(),
                        started_at: None,
                        completed_at: None,
                        original_file_name: None,
                        input_file_name: None,
                        output_file_name: None,
                        json_data: Some(payload.clone()),
                        error_message: None,
                    })
                    .id,
            )
        })?;

        let span = info_span!("execution", execution_id, job_id = job.id);
        let outcome = self
            .run_dynamic(execution_id, &job, mapping, payload, forward)
            .instrument(span)
            .await;
        match outcome {
            Ok(result) => {
                lifecycle::succeed(&self.store, execution_id, None)?;
                Ok(result)
            }
            Err(e) => {
                lifecycle::fail(&self.store, execution_id, e.to_string())?;
                Err(e)
            }
        }
    }

    async fn run_dynamic(
        &self,
        execution_id: Id,
        job: &MappingJob,
        mapping: SourceMapping,
        payload: Value,
        forward: bool,
    ) -> JobResult<Value> {
        lifecycle::begin(&self.store, execution_id)?;
        let result = tokio::task::spawn_blocking(move || transform_document(&mapping, &payload))
            .await
            .map_err(|e| JobError::Task(e.to_string()))??;

        let endpoint = job
            .external_api_endpoint
            .as_deref()
            .ok_or(JobError::MissingEndpoint)?;
        if forward {
            self.endpoints.forward(endpoint, &result).await?;
            debug!(endpoint, "Dynamic result forwarded");
        }
        Ok(result)
    }

    // Executions

    pub fn get_execution(&self, caller: &Caller, id: Id) -> JobResult<MappingExecution> {
        self.store.read(|t| -> JobResult<MappingExecution> {
            let execution = t.executions.require(id)?;
            authorize_job(t, caller, execution.job_id)?;
            Ok(execution.clone())
        })?
    }

    pub fn list_executions(&self, caller: &Caller, job_id: Id) -> JobResult<Vec<MappingExecution>> {
        self.store.read(|t| -> JobResult<Vec<MappingExecution>> {
            authorize_job(t, caller, job_id)?;
            Ok(t.executions_of(job_id).into_iter().cloned().collect())
        })?
    }

    /// Executions of the user's jobs, optionally only those completed in the
    /// last `since_days` days
    pub fn list_user_executions(
        &self,
        caller: &Caller,
        user_id: Id,
        since_days: Option<i64>,
    ) -> JobResult<Vec<MappingExecution>> {
        if !caller.is_admin && caller.id != user_id {
            return Err(JobError::Unauthorized {
                entity: "user",
                id: user_id,
            });
        }
        self.executions_where(|job| job.user_id == user_id, since_days)
    }

    pub fn list_organization_executions(
        &self,
        caller: &Caller,
        organization_id: Id,
        since_days: Option<i64>,
    ) -> JobResult<Vec<MappingExecution>> {
        if !caller.is_admin && !caller.is_member_of(organization_id) {
            return Err(JobError::Unauthorized {
                entity: "organization",
                id: organization_id,
            });
        }
        self.executions_where(|job| job.organization_id == Some(organization_id), since_days)
    }

    fn executions_where(
        &self,
        job_filter: impl Fn(&MappingJob) -> bool,
        since_days: Option<i64>,
    ) -> JobResult<Vec<MappingExecution>> {
        Ok(self.store.read(|t| {
            t.executions
                .iter()
                .filter(|e| t.jobs.get(e.job_id).is_some_and(&job_filter))
                .filter(|e| completed_since(e, since_days))
                .cloned()
                .collect()
        })?)
    }

    pub async fn delete_execution(&self, caller: &Caller, id: Id) -> JobResult<()> {
        let removed = self.store.transaction(|t| {
            let execution = t.executions.require(id)?.clone();
            authorize_job(t, caller, execution.job_id)?;
            t.executions.remove(id);
            Ok::<_, JobError>(execution)
        })?;
        self.remove_artifacts(&removed).await;
        Ok(())
    }
}
