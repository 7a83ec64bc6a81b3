//! Core domain types for the job queue system.
//!
//! This crate contains shared types used across all packages:
//! - Job and JobStatus for work items
//! - QueueEntry for the FIFO index
//! - CommandBuilder for turning a job into an external invocation
//! - Events for lifecycle reporting

mod command;
mod events;
mod job;
mod queue;

pub use command::{CommandBuilder, CommandError, ENTRYPOINT, Invocation, LAUNCHER};
pub use events::JobEvent;
pub use job::{Job, JobId, JobStatus, NewJob, StatusCodeError};
pub use queue::QueueEntry;
