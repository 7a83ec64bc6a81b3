//! Lifecycle events reported by the submission API and the worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Events emitted while jobs move through their lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Submission events
    /// A new job record was stored and enqueued.
    JobCreated {
        job_id: JobId,
        resource: String,
        action: String,
        timestamp: DateTime<Utc>,
    },
    /// An existing job was re-enqueued under a new action.
    JobRequeued {
        job_id: JobId,
        action: String,
        timestamp: DateTime<Utc>,
    },

    // Execution events
    /// A worker marked a job running and is about to spawn its command.
    JobStarted {
        job_id: JobId,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The command finished without a detected failure.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The command reported a failure, or could not be run at all.
    JobFailed {
        job_id: JobId,
        worker_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A dequeued entry was dropped without running anything.
    JobSkipped {
        job_id: JobId,
        worker_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A worker started its loop.
    WorkerStarted {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker stopped its loop.
    WorkerStopped {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The whole pool stopped.
    PoolStopped {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobCreated { timestamp, .. } => *timestamp,
            JobEvent::JobRequeued { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobSkipped { timestamp, .. } => *timestamp,
            JobEvent::WorkerStarted { timestamp, .. } => *timestamp,
            JobEvent::WorkerStopped { timestamp, .. } => *timestamp,
            JobEvent::PoolStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobCreated { job_id, .. } => Some(*job_id),
            JobEvent::JobRequeued { job_id, .. } => Some(*job_id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::JobSkipped { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobCreated {
                job_id,
                resource,
                action,
                ..
            } => format!("Job {} created: {} {}", job_id, action, resource),
            JobEvent::JobRequeued { job_id, action, .. } => {
                format!("Job {} requeued for {}", job_id, action)
            }
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} done in {}ms", job_id, duration_ms),
            JobEvent::JobFailed { job_id, error, .. } => {
                let first_line = error.lines().next().unwrap_or_default();
                format!("Job {} failed: {}", job_id, first_line)
            }
            JobEvent::JobSkipped { job_id, reason, .. } => {
                format!("Job {} skipped: {}", job_id, reason)
            }
            JobEvent::WorkerStarted { worker_id, .. } => format!("Worker {} started", worker_id),
            JobEvent::WorkerStopped { worker_id, .. } => format!("Worker {} stopped", worker_id),
            JobEvent::PoolStopped { reason, .. } => format!("Pool stopped: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_description_uses_first_line() {
        let event = JobEvent::JobFailed {
            job_id: JobId(4),
            worker_id: "worker-1".into(),
            error: "Traceback (most recent call last):\n  File \"x\"".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(
            event.description(),
            "Job 4 failed: Traceback (most recent call last):"
        );
        assert_eq!(event.job_id(), Some(JobId(4)));
    }

    #[test]
    fn worker_events_have_no_job() {
        let event = JobEvent::WorkerStarted {
            worker_id: "worker-2".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.job_id(), None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "worker_started");
    }
}
