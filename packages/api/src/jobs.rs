//! Job submission: create, look up and re-enqueue job records.

use actors::{QueueError, QueueHandle};
use chrono::Utc;
use db::DbError;
use db::repositories::{JobPatch, JobRepository};
use job_core::{Job, JobEvent, JobId, JobStatus, NewJob};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::broadcast;

/// Request type for creating a job.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CreateJobRequest {
    /// Ordered key/value payload; becomes the command's flags.
    #[serde(default)]
    pub request: Map<String, JsonValue>,
    pub resource: String,
    pub action: String,
}

/// Errors returned by the submission API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} is {status}; wait until it is done or error")]
    InFlight { id: JobId, status: JobStatus },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Front door of the job system: stores records and feeds the queue.
///
/// Never waits for execution.
#[derive(Clone)]
pub struct JobService {
    jobs: JobRepository,
    queue: QueueHandle,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl JobService {
    pub fn new(jobs: JobRepository, queue: QueueHandle) -> Self {
        Self {
            jobs,
            queue,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Store a new `processed` job and enqueue it.
    pub async fn create(
        &self,
        payload: &Map<String, JsonValue>,
        resource: &str,
        action: &str,
    ) -> Result<JobId, ApiError> {
        validate_target(resource, action)?;

        let new_job = NewJob::new(payload, resource, action)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let id = self.jobs.insert(&new_job).await?;

        // The record stays stored even when the enqueue fails.
        if let Err(e) = self.queue.insert(id).await {
            tracing::error!("Job {} stored but not enqueued: {}", id, e);
            return Err(e.into());
        }

        tracing::info!("Created job {}: {} {}", id, action, resource);
        self.broadcast(JobEvent::JobCreated {
            job_id: id,
            resource: resource.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
        });

        Ok(id)
    }

    /// [`Self::create`] from a deserialized request.
    pub async fn submit(&self, request: &CreateJobRequest) -> Result<JobId, ApiError> {
        self.create(&request.request, &request.resource, &request.action)
            .await
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, ApiError> {
        match self.jobs.find_one(id).await {
            Ok(job) => Ok(job),
            Err(DbError::NotFound(_)) => Err(ApiError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// List jobs, optionally by status.
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<Job>, ApiError> {
        Ok(self.jobs.list(status, limit).await?)
    }

    /// Re-enqueue a finished job under a new action.
    ///
    /// Only `done` and `error` jobs can move on; the previous error is
    /// cleared before the job is queued again.
    pub async fn transition(&self, job: &Job, action: &str) -> Result<JobId, ApiError> {
        validate_target(&job.resource, action)?;

        let terminal: Vec<JobStatus> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        let patch = JobPatch::new(job.id)
            .status(JobStatus::Processed)
            .action(action)
            .clear_error()
            .expecting(&terminal);

        match self.jobs.update(&patch).await {
            Ok(_) => {}
            Err(DbError::NotFound(_)) => return Err(ApiError::NotFound(job.id)),
            Err(DbError::StatusConflict { id, actual, .. }) => {
                return Err(ApiError::InFlight { id, status: actual });
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.queue.insert(job.id).await {
            tracing::error!("Job {} requeued but not enqueued: {}", job.id, e);
            return Err(e.into());
        }

        tracing::info!("Requeued job {} for {}", job.id, action);
        self.broadcast(JobEvent::JobRequeued {
            job_id: job.id,
            action: action.to_string(),
            timestamp: Utc::now(),
        });

        Ok(job.id)
    }

    /// [`Self::transition`] by id.
    pub async fn transition_id(&self, id: JobId, action: &str) -> Result<JobId, ApiError> {
        let job = self.get(id).await?;
        self.transition(&job, action).await
    }
}

/// Resource and action become positional arguments, so neither may be blank.
fn validate_target(resource: &str, action: &str) -> Result<(), ApiError> {
    if resource.trim().is_empty() {
        return Err(ApiError::InvalidRequest("resource is empty".into()));
    }
    if action.trim().is_empty() {
        return Err(ApiError::InvalidRequest("action is empty".into()));
    }
    Ok(())
}
