//! Background execution of static uploads
//!
//! Submissions hand execution ids to an [`ExecutionQueue`]. One worker task
//! receives them and runs each on its own task inside a `JoinSet`; shutting
//! the queue down closes the channel and waits for in-flight runs.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::error::{JobError, JobResult};
use super::lifecycle;
use crate::storage::StorageBackend;
use crate::store::{Id, MappingExecution, RecordStore};
use crate::transform::transform_document;

/// Storage key of an execution output
pub fn output_key() -> String {
    format!("execution_{}.json", Uuid::new_v4())
}

/// Runs one static execution from normalized input to output artifact
#[derive(Clone)]
pub struct ExecutionRunner {
    store: Arc<RecordStore>,
    storage: Arc<dyn StorageBackend>,
}

impl ExecutionRunner {
    pub fn new(store: Arc<RecordStore>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { store, storage }
    }

    /// Begin, transform and record the outcome
    ///
    /// Processing failures end up on the execution row; only store errors are
    /// returned.
    pub async fn run(&self, execution_id: Id) -> JobResult<MappingExecution> {
        let execution = lifecycle::begin(&self.store, execution_id)?;
        match self.process(&execution).await {
            Ok(output) => Ok(lifecycle::succeed(&self.store, execution_id, Some(output))?),
            Err(e) => Ok(lifecycle::fail(&self.store, execution_id, e.to_string())?),
        }
    }

    async fn process(&self, execution: &MappingExecution) -> JobResult<String> {
        let input = execution
            .input_file_name
            .as_deref()
            .ok_or(JobError::MissingInput(execution.id))?;
        let mapping = self
            .store
            .read(|t| t.source_mappings.require(execution.source_mapping_id).cloned())??;

        let content = self.storage.read_file(input).await?;
        let document: Value = serde_json::from_slice(&content)?;
        debug!(input, bytes = content.len(), "Execution input loaded");

        let output = tokio::task::spawn_blocking(move || transform_document(&mapping, &document))
            .await
            .map_err(|e| JobError::Task(e.to_string()))??;

        let key = output_key();
        self.storage.write_file(&key, &serde_json::to_vec(&output)?).await?;
        Ok(key)
    }
}

/// Queue of static executions waiting to run
pub struct ExecutionQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Id>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionQueue {
    /// Spawn the worker task; must be called inside a tokio runtime
    pub fn start(runner: ExecutionRunner) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(Self::work(runner, receiver));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    async fn work(runner: ExecutionRunner, mut receiver: mpsc::UnboundedReceiver<Id>) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(execution_id) => {
                        let runner = runner.clone();
                        let span = info_span!("execution", execution_id);
                        tasks.spawn(
                            async move {
                                if let Err(e) = runner.run(execution_id).await {
                                    error!(error = %e, "Execution could not be recorded");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Execution task aborted");
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Execution task aborted");
            }
        }
        info!("Execution queue drained");
    }

    /// Schedule an execution; returns immediately
    pub fn enqueue(&self, execution_id: Id) -> JobResult<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|e| JobError::Task(e.to_string()))?;
        sender
            .as_ref()
            .ok_or(JobError::QueueClosed)?
            .send(execution_id)
            .map_err(|_| JobError::QueueClosed)?;
        debug!(execution_id, "Execution queued");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }

    /// Stop accepting work and wait for queued and running executions
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().map(|mut s| s.take()).unwrap_or_default();
        drop(sender);
        let worker = self.worker.lock().map(|mut w| w.take()).unwrap_or_default();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Execution worker ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorageBackend;
    use crate::store::{JobType, MappingJob, MappingStatus, SourceMapping, StoreError};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn seed(store: &RecordStore, input: Option<&str>, expression: &str) -> Id {
        store
            .transaction(|t| {
                let mapping_id = t
                    .source_mappings
                    .insert_with(|id| SourceMapping {
                        id,
                        input_definition_id: 1,
                        name: "m".into(),
                        file_type: None,
                        input_schema: json!({}),
                        output_schema: json!({}),
                        mapping: Some([("out", expression)].into_iter().collect()),
                        model_id: None,
                        target_path: None,
                    })
                    .id;
                let job_id = t
                    .jobs
                    .insert_with(|id| MappingJob {
                        id,
                        uuid: Uuid::new_v4(),
                        name: "j".into(),
                        job_type: JobType::Static,
                        external_api_endpoint: None,
                        status: MappingStatus::Pending,
                        created_at: Utc::now(),
                        started_at: None,
                        completed_at: None,
                        user_id: 1,
                        organization_id: None,
                        input_definition_id: 1,
                    })
                    .id;
                Ok::<_, StoreError>(
                    t.executions
                        .insert_with(|id| MappingExecution {
                            id,
                            job_id,
                            source_mapping_id: mapping_id,
                            data_size_bytes: 10,
                            status: MappingStatus::Pending,
                            attempts: 0,
                            created_at: Utc::now(),
                            started_at: None,
                            completed_at: None,
                            original_file_name: None,
                            input_file_name: input.map(str::to_string),
                            output_file_name: None,
                            json_data: None,
                            error_message: None,
                        })
                        .id,
                )
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_queue_runs_and_drains() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        storage
            .write_file("in.json", br#"[{"a": 1}, {"a": 2}]"#)
            .await
            .unwrap();
        let store = Arc::new(RecordStore::new());
        let execution_id = seed(&store, Some("in.json"), "a * 10");

        let queue = ExecutionQueue::start(ExecutionRunner::new(store.clone(), storage.clone()));
        queue.enqueue(execution_id).unwrap();
        queue.shutdown().await;
        assert!(queue.is_closed());
        assert!(matches!(queue.enqueue(execution_id), Err(JobError::QueueClosed)));

        let execution = store
            .read(|t| t.executions.get(execution_id).cloned())
            .unwrap()
            .unwrap();
        assert_eq!(execution.status, MappingStatus::Success);
        let output = execution.output_file_name.unwrap();
        assert!(output.starts_with("execution_"));
        let content: Value =
            serde_json::from_slice(&storage.read_file(&output).await.unwrap()).unwrap();
        assert_eq!(content, json!([{"out": 10}, {"out": 20}]));
    }

    #[tokio::test]
    async fn test_missing_input_fails_execution() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        let store = Arc::new(RecordStore::new());
        let execution_id = seed(&store, None, "a");

        let execution = ExecutionRunner::new(store, storage)
            .run(execution_id)
            .await
            .unwrap();
        assert_eq!(execution.status, MappingStatus::Failed);
        assert_eq!(execution.attempts, 1);
        assert!(
            execution
                .error_message
                .unwrap()
                .contains("No input file specified")
        );
    }
}
