//! Execution state transitions
//!
//! `PENDING -> RUNNING -> SUCCESS | FAILED`. Each transition updates the
//! execution and its job inside one store transaction. Both rows are looked up
//! before the first write, so a missing row leaves the store untouched.
//!
//! The job fails as soon as one execution fails. It only succeeds once every
//! execution has succeeded, and a job that already failed is not pulled back
//! to `RUNNING` by a sibling starting late. A job whose executions have all
//! completed always ends in a terminal status.

use chrono::Utc;
use tracing::{error, info};

use crate::store::{Id, MappingExecution, MappingStatus, RecordStore, StoreResult, Tables};

fn job_of(tables: &Tables, execution_id: Id) -> StoreResult<Id> {
    let job_id = tables.executions.require(execution_id)?.job_id;
    tables.jobs.require(job_id)?;
    Ok(job_id)
}

/// Count an attempt and mark the execution running
pub fn begin(store: &RecordStore, execution_id: Id) -> StoreResult<MappingExecution> {
    store.transaction(|t| {
        let job_id = job_of(t, execution_id)?;
        let now = Utc::now();

        let execution = t.executions.require_mut(execution_id)?;
        execution.attempts += 1;
        execution.started_at = Some(now);
        execution.completed_at = None;
        execution.status = MappingStatus::Running;
        let snapshot = execution.clone();

        let job = t.jobs.require_mut(job_id)?;
        if job.status != MappingStatus::Failed {
            job.status = MappingStatus::Running;
        }
        job.started_at.get_or_insert(now);

        info!(execution_id, job_id, attempt = snapshot.attempts, "Execution started");
        Ok(snapshot)
    })
}

/// Mark the execution failed and fail its job immediately
pub fn fail(
    store: &RecordStore,
    execution_id: Id,
    message: impl Into<String>,
) -> StoreResult<MappingExecution> {
    let message = message.into();
    store.transaction(|t| {
        let job_id = job_of(t, execution_id)?;
        let now = Utc::now();

        let execution = t.executions.require_mut(execution_id)?;
        execution.status = MappingStatus::Failed;
        execution.error_message = Some(message);
        execution.completed_at = Some(now);
        let snapshot = execution.clone();

        let job = t.jobs.require_mut(job_id)?;
        job.status = MappingStatus::Failed;
        job.completed_at = Some(now);

        error!(
            execution_id,
            job_id,
            error = snapshot.error_message.as_deref().unwrap_or_default(),
            "Execution failed"
        );
        Ok(snapshot)
    })
}

/// Mark the execution successful and re-aggregate its job
pub fn succeed(
    store: &RecordStore,
    execution_id: Id,
    output_file_name: Option<String>,
) -> StoreResult<MappingExecution> {
    store.transaction(|t| {
        let job_id = job_of(t, execution_id)?;
        let now = Utc::now();

        let execution = t.executions.require_mut(execution_id)?;
        execution.status = MappingStatus::Success;
        execution.output_file_name = output_file_name;
        execution.error_message = None;
        execution.completed_at = Some(now);
        let snapshot = execution.clone();

        let siblings = t.executions_of(job_id);
        let all_succeeded = siblings.iter().all(|e| e.status == MappingStatus::Success);
        let any_failed = siblings.iter().any(|e| e.status == MappingStatus::Failed);
        let all_completed = siblings.iter().all(|e| e.completed_at.is_some());

        let job = t.jobs.require_mut(job_id)?;
        if all_succeeded {
            job.status = MappingStatus::Success;
        } else if any_failed {
            job.status = MappingStatus::Failed;
        }
        if all_completed {
            job.completed_at = Some(now);
        }

        info!(execution_id, job_id, job_status = %job.status, "Execution succeeded");
        Ok(snapshot)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JobType, MappingJob, StoreError};
    use uuid::Uuid;

    fn seed(executions: usize) -> (RecordStore, Id, Vec<Id>) {
        let store = RecordStore::new();
        let (job_id, ids) = store
            .transaction(|t| {
                let job_id = t
                    .jobs
                    .insert_with(|id| MappingJob {
                        id,
                        uuid: Uuid::new_v4(),
                        name: "job".into(),
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
                let ids = (0..executions)
                    .map(|_| {
                        t.executions
                            .insert_with(|id| MappingExecution {
                                id,
                                job_id,
                                source_mapping_id: id,
                                data_size_bytes: 0,
                                status: MappingStatus::Pending,
                                attempts: 0,
                                created_at: Utc::now(),
                                started_at: None,
                                completed_at: None,
                                original_file_name: None,
                                input_file_name: None,
                                output_file_name: None,
                                json_data: None,
                                error_message: None,
                            })
                            .id
                    })
                    .collect();
                Ok::<_, StoreError>((job_id, ids))
            })
            .unwrap();
        (store, job_id, ids)
    }

    fn job_status(store: &RecordStore, job_id: Id) -> MappingStatus {
        store.read(|t| t.jobs.get(job_id).map(|j| j.status)).unwrap().unwrap()
    }

    #[test]
    fn test_success_needs_every_execution() {
        let (store, job_id, ids) = seed(2);

        begin(&store, ids[0]).unwrap();
        assert_eq!(job_status(&store, job_id), MappingStatus::Running);
        succeed(&store, ids[0], Some("a.json".into())).unwrap();
        assert_eq!(job_status(&store, job_id), MappingStatus::Running);

        begin(&store, ids[1]).unwrap();
        let done = succeed(&store, ids[1], Some("b.json".into())).unwrap();
        assert_eq!(done.attempts, 1);
        assert_eq!(job_status(&store, job_id), MappingStatus::Success);
        assert!(store.read(|t| t.jobs.get(job_id).unwrap().completed_at.is_some()).unwrap());
    }

    #[test]
    fn test_fail_fast_is_sticky() {
        let (store, job_id, ids) = seed(2);
        begin(&store, ids[0]).unwrap();
        fail(&store, ids[0], "boom").unwrap();
        assert_eq!(job_status(&store, job_id), MappingStatus::Failed);

        begin(&store, ids[1]).unwrap();
        succeed(&store, ids[1], None).unwrap();
        assert_eq!(job_status(&store, job_id), MappingStatus::Failed);
    }

    #[test]
    fn test_failure_leaves_siblings_untouched() {
        let (store, _, ids) = seed(3);
        begin(&store, ids[0]).unwrap();
        succeed(&store, ids[0], Some("a.json".into())).unwrap();
        begin(&store, ids[1]).unwrap();

        begin(&store, ids[2]).unwrap();
        fail(&store, ids[2], "boom").unwrap();

        let rows = store
            .read(|t| ids.iter().map(|id| t.executions.get(*id).cloned()).collect::<Vec<_>>())
            .unwrap();
        let done = rows[0].as_ref().unwrap();
        assert_eq!(done.status, MappingStatus::Success);
        assert_eq!(done.output_file_name.as_deref(), Some("a.json"));
        assert!(done.error_message.is_none());
        let running = rows[1].as_ref().unwrap();
        assert_eq!(running.status, MappingStatus::Running);
        assert!(running.completed_at.is_none());
    }

    #[test]
    fn test_success_only_after_last_of_many() {
        let (store, job_id, ids) = seed(4);
        for id in &ids {
            begin(&store, *id).unwrap();
        }
        let order = [ids[2], ids[0], ids[3], ids[1]];
        for (i, id) in order.iter().enumerate() {
            succeed(&store, *id, Some(format!("{id}.json"))).unwrap();
            let expected = if i + 1 == order.len() {
                MappingStatus::Success
            } else {
                MappingStatus::Running
            };
            assert_eq!(job_status(&store, job_id), expected);
        }
    }

    #[test]
    fn test_completed_job_with_failed_execution_ends_failed() {
        let (store, job_id, ids) = seed(2);
        begin(&store, ids[0]).unwrap();
        fail(&store, ids[0], "bad input").unwrap();

        // a re-submission of the sibling put the job back to pending
        store
            .transaction(|t| {
                let job = t.jobs.require_mut(job_id)?;
                job.status = MappingStatus::Pending;
                job.completed_at = None;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        begin(&store, ids[1]).unwrap();
        succeed(&store, ids[1], None).unwrap();

        let job = store.read(|t| t.jobs.get(job_id).cloned()).unwrap().unwrap();
        assert_eq!(job.status, MappingStatus::Failed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_attempts_count_runs() {
        let (store, _, ids) = seed(1);
        begin(&store, ids[0]).unwrap();
        fail(&store, ids[0], "first").unwrap();
        let second = begin(&store, ids[0]).unwrap();
        assert_eq!(second.attempts, 2);
        assert_eq!(second.status, MappingStatus::Running);
    }

    #[test]
    fn test_missing_execution_changes_nothing() {
        let (store, job_id, _) = seed(1);
        assert!(matches!(
            begin(&store, 99),
            Err(StoreError::NotFound { id: 99, .. })
        ));
        assert_eq!(job_status(&store, job_id), MappingStatus::Pending);
    }
}
