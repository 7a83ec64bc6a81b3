//! Queue entry types for the FIFO index over job ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// One position in the FIFO queue.
///
/// The same job id may appear in many entries over time; `seq` is what
/// orders and identifies an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Insertion sequence number, strictly increasing.
    pub seq: i64,
    /// The job record this entry points at.
    pub job_id: JobId,
    /// Consumer currently holding this entry, if it was dequeued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    /// When the entry was dequeued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Check if a consumer dequeued this entry and has not deleted it yet.
    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }
}
