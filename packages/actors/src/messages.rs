//! Message and error types for actor communication.

use db::DbError;
use job_core::{JobId, QueueEntry};
use ractor::RpcReplyPort;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Append a job id at the tail.
    Insert {
        job_id: JobId,
        reply: RpcReplyPort<Result<QueueEntry, QueueError>>,
    },

    /// Dequeue the head entry for a consumer.
    Get {
        consumer: String,
        reply: RpcReplyPort<Result<Option<QueueEntry>, QueueError>>,
    },

    /// Remove the entry the consumer is currently holding.
    Delete {
        consumer: String,
        reply: RpcReplyPort<Result<QueueEntry, QueueError>>,
    },

    /// Number of stored entries, claimed or not.
    Len {
        reply: RpcReplyPort<Result<usize, QueueError>>,
    },

    /// Stop the queue actor.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one pass: dequeue, execute, record.
    Poll,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Ask every worker to stop after its current pass.
    Shutdown,

    /// Number of workers still running.
    LiveWorkers { reply: RpcReplyPort<usize> },
}

/// Errors returned by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(#[from] DbError),

    #[error("queue actor unavailable: {0}")]
    Unavailable(String),

    #[error("consumer {0} has no dequeued entry to delete")]
    NothingInFlight(String),
}

/// Systemic failures that stop a worker.
///
/// Anything that only concerns one job (bad request, spawn failure, a
/// failure marker in the output) is recorded on the job instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("record store error: {0}")]
    Storage(#[from] DbError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
