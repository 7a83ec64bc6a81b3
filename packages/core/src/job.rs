//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a job record, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A stored status code outside the closed set of lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status code: {0}")]
pub struct StatusCodeError(pub i64);

/// Lifecycle state of a job record.
///
/// Persisted as a stable integer code. A single execution attempt only ever
/// moves `Processed -> Started -> {Done | Error}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum JobStatus {
    /// Queued and waiting for a worker.
    #[default]
    Processed,
    /// A worker is executing the job.
    Started,
    /// The external process finished without a detected failure.
    Done,
    /// The external process reported a failure.
    Error,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Processed,
        JobStatus::Started,
        JobStatus::Done,
        JobStatus::Error,
    ];

    /// Stable integer code used in storage.
    pub fn code(self) -> i64 {
        match self {
            JobStatus::Processed => 0,
            JobStatus::Started => 1,
            JobStatus::Done => 2,
            JobStatus::Error => 3,
        }
    }

    /// Decode a stored status code.
    pub fn from_code(code: i64) -> Result<Self, StatusCodeError> {
        match code {
            0 => Ok(JobStatus::Processed),
            1 => Ok(JobStatus::Started),
            2 => Ok(JobStatus::Done),
            3 => Ok(JobStatus::Error),
            other => Err(StatusCodeError(other)),
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Get a simple status string for display.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processed => "processed",
            JobStatus::Started => "started",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobStatus> for i64 {
    fn from(status: JobStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i64> for JobStatus {
    type Error = StatusCodeError;

    fn try_from(code: i64) -> Result<Self, StatusCodeError> {
        JobStatus::from_code(code)
    }
}

/// A persisted unit of work: the caller's payload, its target and action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier assigned by the store.
    pub id: JobId,
    /// Request payload, stored verbatim as serialized JSON text.
    pub request: String,
    /// Sub-target the job concerns.
    pub resource: String,
    /// Operation to perform (`deploy`, `start`, `stop`, ...).
    pub action: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Failure detail; only meaningful when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// The caller-supplied fields of a job that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub request: String,
    pub resource: String,
    pub action: String,
    pub status: JobStatus,
}

impl NewJob {
    /// Create a queued job from a request payload.
    pub fn new(
        request: &Map<String, Value>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            request: serde_json::to_string(request)?,
            resource: resource.into(),
            action: action.into(),
            status: JobStatus::Processed,
        })
    }

    /// Create a job from request text that is already serialized.
    pub fn from_raw(
        request: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            resource: resource.into(),
            action: action.into(),
            status: JobStatus::Processed,
        }
    }
}
