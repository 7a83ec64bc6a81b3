//! Submission API for the job queue system.
//!
//! This crate contains the operations callers use to feed the worker pool:
//! - `create` a job record and enqueue it
//! - `get` a job record
//! - `transition` a finished job to a new action and enqueue it again
//!
//! `JobSystem` wires the store, the queue actor and the event channel
//! together for a process.

mod init;
mod jobs;

pub use init::JobSystem;
pub use jobs::{ApiError, CreateJobRequest, JobService};

// Re-export core types for convenience
pub use job_core::{Job, JobEvent, JobId, JobStatus};
