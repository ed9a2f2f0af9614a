//! Execution and job output downloads

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::error::{JobError, JobResult};
use super::service::JobService;
use crate::auth::Caller;
use crate::storage::StorageBackend;
use crate::store::{Id, MappingExecution, Tables};

/// Output artifact of one execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// One part of an aggregate download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    /// Key in the aggregate object
    pub key: String,
    /// Storage key of the execution output
    pub path: String,
}

/// Aggregate of every output of a job
pub enum JobDownload {
    /// Small aggregates, built in memory
    Inline(Value),
    /// Large aggregates, written out entry by entry
    Stream(JobStream),
}

impl JobDownload {
    /// Suggested attachment name
    pub fn file_name(job_id: Id) -> String {
        format!("mapping_job_{job_id}_outputs.json")
    }
}

/// Writes `{"<key>":<output>,...}` without holding outputs in memory
pub struct JobStream {
    entries: Vec<OutputEntry>,
    storage: Arc<dyn StorageBackend>,
    chunk_size: usize,
}

impl JobStream {
    pub fn entries(&self) -> &[OutputEntry] {
        &self.entries
    }

    /// Copy the aggregate into `out`; returns the number of bytes written
    pub async fn write_to<W>(&self, out: &mut W) -> JobResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut written: u64 = 0;
        let mut buf = vec![0u8; self.chunk_size.max(1)];

        out.write_all(b"{").await?;
        written += 1;
        for (i, entry) in self.entries.iter().enumerate() {
            let mut head = Vec::new();
            if i > 0 {
                head.push(b',');
            }
            head.extend(serde_json::to_vec(&entry.key)?);
            head.push(b':');
            out.write_all(&head).await?;
            written += head.len() as u64;

            let mut reader = self.storage.open_reader(&entry.path).await?;
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await?;
                written += n as u64;
            }
        }
        out.write_all(b"}").await?;
        written += 1;
        out.flush().await?;

        debug!(entries = self.entries.len(), bytes = written, "Aggregate streamed");
        Ok(written)
    }
}

/// Aggregate key of an execution: the mapping's target path, else `execution_<id>`
fn output_key(tables: &Tables, execution: &MappingExecution) -> String {
    tables
        .source_mappings
        .get(execution.source_mapping_id)
        .and_then(|m| m.target_path.clone())
        .unwrap_or_else(|| format!("execution_{}", execution.id))
}

/// First claim on a key keeps it; later executions get an `_<id>` suffix
fn claim_key(used: &mut HashSet<String>, key: String, execution_id: Id) -> String {
    let mut candidate = key.clone();
    let mut round = 1;
    while used.contains(&candidate) {
        candidate = if round == 1 {
            format!("{key}_{execution_id}")
        } else {
            format!("{key}_{execution_id}_{round}")
        };
        round += 1;
    }
    used.insert(candidate.clone());
    candidate
}

impl JobService {
    /// Read the output of one execution
    pub async fn download_execution(
        &self,
        caller: &Caller,
        execution_id: Id,
    ) -> JobResult<ExecutionOutput> {
        let execution = self.get_execution(caller, execution_id)?;
        let path = execution
            .output_file_name
            .ok_or(JobError::NoOutput(execution_id))?;
        let content = self.storage.read_file(&path).await?;
        let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Ok(ExecutionOutput { file_name, content })
    }

    /// Collect every execution output of a job into one JSON object
    ///
    /// Aggregates whose executions processed at most `aggregate_inline_limit`
    /// input bytes are returned inline; larger ones as a [`JobStream`].
    pub async fn download_job(&self, caller: &Caller, job_id: Id) -> JobResult<JobDownload> {
        let (entries, total_bytes) = self.store.read(|t| -> JobResult<(Vec<OutputEntry>, u64)> {
            super::service::authorize_job(t, caller, job_id)?;
            let mut total = 0;
            let mut used = HashSet::new();
            let entries = t
                .executions_of(job_id)
                .into_iter()
                .filter_map(|e| {
                    let path = e.output_file_name.clone()?;
                    total += e.data_size_bytes;
                    Some(OutputEntry {
                        key: claim_key(&mut used, output_key(t, e), e.id),
                        path,
                    })
                })
                .collect();
            Ok((entries, total))
        })??;

        if entries.is_empty() {
            return Err(JobError::NoJobOutputs(job_id));
        }

        if total_bytes > self.config.aggregate_inline_limit {
            debug!(job_id, total_bytes, "Streaming aggregate download");
            return Ok(JobDownload::Stream(JobStream {
                entries,
                storage: self.storage.clone(),
                chunk_size: self.config.read_chunk_size,
            }));
        }

        let mut aggregated = Map::new();
        for entry in entries {
            let content = self.storage.read_file(&entry.path).await?;
            aggregated.insert(entry.key, serde_json::from_slice(&content)?);
        }
        Ok(JobDownload::Inline(Value::Object(aggregated)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorageBackend;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stream_writes_valid_json() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        storage.write_file("a.json", br#"[{"x":1}]"#).await.unwrap();
        storage.write_file("b.json", br#"{"y":"z"}"#).await.unwrap();

        let stream = JobStream {
            entries: vec![
                OutputEntry {
                    key: "orders".into(),
                    path: "a.json".into(),
                },
                OutputEntry {
                    key: "execution_2".into(),
                    path: "b.json".into(),
                },
            ],
            storage,
            chunk_size: 3,
        };

        let mut out = Vec::new();
        let written = stream.write_to(&mut out).await.unwrap();
        assert_eq!(written, out.len() as u64);
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({"orders": [{"x": 1}], "execution_2": {"y": "z"}})
        );
    }

    #[test]
    fn test_shared_target_path_keys_stay_distinct() {
        let mut used = HashSet::new();
        assert_eq!(claim_key(&mut used, "people".into(), 1), "people");
        assert_eq!(claim_key(&mut used, "people".into(), 2), "people_2");
        assert_eq!(claim_key(&mut used, "people_3".into(), 9), "people_3");
        assert_eq!(claim_key(&mut used, "people".into(), 3), "people_3_3");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(JobDownload::file_name(4), "mapping_job_4_outputs.json");
    }
}
