//! One execution attempt, from dequeue to the terminal status write.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use db::DbError;
use db::repositories::{JobPatch, JobRepository};
use job_core::{JobEvent, JobId, JobStatus};
use tokio::sync::broadcast;

use crate::executor::{FailurePolicy, JobExecutor};
use crate::messages::WorkerError;
use crate::queue_actor::QueueHandle;

/// Outcome of a single [`Worker::run_once`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// The queue was empty.
    Idle,
    /// A job ran and was recorded as `done` or `error`.
    Finished { id: JobId, status: JobStatus },
    /// The dequeued entry was dropped without running anything.
    Skipped { id: JobId },
}

/// Dequeues jobs and drives them through one attempt each.
#[derive(Clone)]
pub struct Worker {
    id: String,
    jobs: JobRepository,
    queue: QueueHandle,
    executor: Arc<dyn JobExecutor>,
    policy: Arc<dyn FailurePolicy>,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        jobs: JobRepository,
        queue: QueueHandle,
        executor: Arc<dyn JobExecutor>,
        policy: Arc<dyn FailurePolicy>,
    ) -> Self {
        Self {
            id: id.into(),
            jobs,
            queue,
            executor,
            policy,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run one non-blocking pass.
    ///
    /// Errors are systemic (store or queue unusable); anything that only
    /// concerns the job is recorded on the job.
    pub async fn run_once(&self) -> Result<Iteration, WorkerError> {
        let Some(entry) = self.queue.get(&self.id).await? else {
            return Ok(Iteration::Idle);
        };
        let id = entry.job_id;

        let patch = JobPatch::new(id)
            .status(JobStatus::Started)
            .expecting(&[JobStatus::Processed]);
        let job = match self.jobs.update(&patch).await {
            Ok(job) => job,
            Err(DbError::NotFound(_)) => {
                return self.skip(id, "no job record".to_string()).await;
            }
            Err(DbError::StatusConflict { actual, .. }) => {
                return self.skip(id, format!("job is already {}", actual)).await;
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("{} started job {} ({} {})", self.id, id, job.action, job.resource);
        self.broadcast(JobEvent::JobStarted {
            job_id: id,
            worker_id: self.id.clone(),
            timestamp: Utc::now(),
        });

        let began = Instant::now();
        let failure = match self.executor.execute(&job).await {
            Ok(output) => {
                tracing::debug!(
                    "Job {} exited with {:?} ({} bytes stdout, {} bytes stderr)",
                    id,
                    output.exit_code,
                    output.stdout.len(),
                    output.stderr.len()
                );
                self.policy.failure(&output)
            }
            Err(e) => Some(e.to_string()),
        };
        let duration_ms = began.elapsed().as_millis() as u64;

        let patch = match &failure {
            None => JobPatch::new(id).status(JobStatus::Done).clear_error(),
            Some(error) => JobPatch::new(id).status(JobStatus::Error).error(error.clone()),
        }
        .expecting(&[JobStatus::Started]);
        let finished = self.jobs.update(&patch).await?;

        self.queue.delete(&self.id).await?;

        match failure {
            None => {
                tracing::info!("Job {} done in {}ms", id, duration_ms);
                self.broadcast(JobEvent::JobCompleted {
                    job_id: id,
                    worker_id: self.id.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            Some(error) => {
                tracing::warn!(
                    "Job {} failed: {}",
                    id,
                    error.lines().next().unwrap_or_default()
                );
                self.broadcast(JobEvent::JobFailed {
                    job_id: id,
                    worker_id: self.id.clone(),
                    error,
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(Iteration::Finished {
            id,
            status: finished.status,
        })
    }

    async fn skip(&self, id: JobId, reason: String) -> Result<Iteration, WorkerError> {
        tracing::warn!("{} skipping job {}: {}", self.id, id, reason);

        self.queue.delete(&self.id).await?;

        self.broadcast(JobEvent::JobSkipped {
            job_id: id,
            worker_id: self.id.clone(),
            reason,
            timestamp: Utc::now(),
        });

        Ok(Iteration::Skipped { id })
    }
}
