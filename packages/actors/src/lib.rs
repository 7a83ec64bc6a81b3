//! Actor system for the job queue.
//!
//! This crate provides the Ractor-based worker pool that drains the job
//! queue and runs each job as an external process.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns the FIFO queue; its mailbox serialises dequeues
//! - `Supervisor` - Spawns the workers and decides how the pool ends
//! - `WorkerActor` - Polls the queue and runs one job per pass
//!
//! # Usage
//!
//! ```ignore
//! use actors::{PoolConfig, PoolDeps, QueueHandle, start_pool};
//!
//! let (queue, _) = QueueHandle::spawn(queue_repo).await?;
//! let deps = PoolDeps::new(jobs, queue, executor, policy);
//! let pool = start_pool(PoolConfig::default(), deps).await?;
//!
//! pool.shutdown();
//! let exit = pool.wait().await;
//! ```

mod executor;
mod messages;
mod queue_actor;
mod supervisor;
mod worker;
mod worker_actor;

pub use executor::{
    DEFAULT_FAILURE_MARKER, ExecError, ExecFuture, FailurePolicy, FnExecutor, JobExecutor,
    MarkerPolicy, ProcessExecutor, ProcessOutput,
};
pub use messages::{QueueError, QueueMessage, SupervisorMessage, WorkerError, WorkerMessage};
pub use queue_actor::{QueueActor, QueueHandle};
pub use supervisor::{
    PoolConfig, PoolDeps, PoolExit, PoolHandle, RunMode, Supervisor, start_pool,
};
pub use worker::{Iteration, Worker};
pub use worker_actor::WorkerActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
