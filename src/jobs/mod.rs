//! Mapping jobs and their executions
//!
//! A job runs the mappings of one input definition. Static jobs take file
//! uploads that are normalized, queued and transformed in the background;
//! dynamic jobs map single payloads while the caller waits and forward the
//! result to the job's endpoint.
//!
//! Execution state changes go through [`lifecycle`], which keeps each job's
//! status consistent with its executions.

mod download;
pub mod endpoint;
mod error;
pub mod lifecycle;
mod service;
mod worker;

pub use download::{ExecutionOutput, JobDownload, JobStream, OutputEntry};
pub use endpoint::{EndpointClient, EndpointError, EndpointResult, HttpEndpointClient};
pub use error::{JobError, JobResult};
pub use service::{JobService, JobUpdate, NewJob, Upload};
pub use worker::{ExecutionQueue, ExecutionRunner};
