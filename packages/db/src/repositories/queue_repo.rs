//! Queue repository: a persistent FIFO of job ids.

use std::sync::Arc;

use job_core::{JobId, QueueEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::counter;
use crate::retry;
use crate::schema::verify_schema;
use crate::{Database, DbError};

const ENTRY_FIELDS: &str = "seq, job_id, claimed_by, claimed_at";

/// Repository for queue persistence operations.
#[derive(Clone)]
pub struct QueueRepository {
    db: Database,
    /// Serialises sequence allocation within this process.
    alloc: Arc<Mutex<()>>,
}

/// Struct for appending entries - omits claim and datetime fields.
#[derive(Debug, Clone, Serialize)]
struct EntryCreate {
    seq: i64,
    job_id: JobId,
}

#[derive(Deserialize)]
struct SeqRecord {
    #[allow(dead_code)]
    seq: i64,
}

impl QueueRepository {
    /// Wrap a connection without checking the schema.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            alloc: Arc::new(Mutex::new(())),
        }
    }

    /// Wrap a connection, failing if the schema has not been initialized.
    pub async fn open(db: Database) -> Result<Self, DbError> {
        verify_schema(&db).await?;
        Ok(Self::new(db))
    }

    /// Append a job id at the tail.
    pub async fn insert(&self, job_id: JobId) -> Result<QueueEntry, DbError> {
        let _guard = self.alloc.lock().await;
        let seq = counter::next_value(&self.db, "queue").await?;

        let db = &self.db;
        retry::on_conflict("queue insert", move || async move {
            db.query("CREATE type::thing('queue', $seq) CONTENT $content RETURN NONE")
                .bind(("seq", seq))
                .bind(("content", EntryCreate { seq, job_id }))
                .await?
                .check()?;
            Ok::<_, DbError>(())
        })
        .await?;

        tracing::debug!("Enqueued job {} at position {}", job_id, seq);

        Ok(QueueEntry {
            seq,
            job_id,
            claimed_by: None,
            claimed_at: None,
        })
    }

    /// The oldest entry nobody has dequeued yet.
    pub async fn head(&self) -> Result<Option<QueueEntry>, DbError> {
        let db = &self.db;
        let records: Vec<QueueEntry> = retry::on_conflict("queue head", move || async move {
            let mut response = db
                .query(format!(
                    "SELECT {} FROM queue WHERE claimed_by = NONE ORDER BY seq ASC LIMIT 1",
                    ENTRY_FIELDS
                ))
                .await?;
            let records: Vec<QueueEntry> = response.take(0)?;
            Ok::<_, DbError>(records)
        })
        .await?;

        Ok(records.into_iter().next())
    }

    /// Mark an entry as dequeued by `consumer`.
    ///
    /// Compare-and-set: returns `false` when someone else claimed it first.
    /// When both claims commit concurrently the loser fails with
    /// [`DbError::Conflict`] instead.
    pub async fn claim(&self, seq: i64, consumer: &str) -> Result<bool, DbError> {
        let mut response = self
            .db
            .query(
                "UPDATE type::thing('queue', $seq) SET claimed_by = $consumer, claimed_at = time::now() WHERE claimed_by = NONE RETURN AFTER",
            )
            .bind(("seq", seq))
            .bind(("consumer", consumer.to_string()))
            .await?;

        let records: Vec<SeqRecord> = response.take(0)?;

        Ok(!records.is_empty())
    }

    /// Dequeue the head entry for `consumer`.
    ///
    /// The entry stays in the table, claimed, until [`Self::delete`] removes
    /// it. Returns `None` when no unclaimed entry exists.
    ///
    /// Safe under concurrent callers, in this process or another one sharing
    /// the store: a lost claim moves on to the next head.
    pub async fn get(&self, consumer: &str) -> Result<Option<QueueEntry>, DbError> {
        let mut conflicts = 0;
        loop {
            let Some(mut entry) = self.head().await? else {
                return Ok(None);
            };

            match self.claim(entry.seq, consumer).await {
                Ok(true) => {
                    entry.claimed_by = Some(consumer.to_string());
                    entry.claimed_at = Some(chrono::Utc::now());
                    tracing::debug!(
                        "{} dequeued job {} (position {})",
                        consumer,
                        entry.job_id,
                        entry.seq
                    );
                    return Ok(Some(entry));
                }
                Ok(false) => {
                    tracing::debug!("Lost race for position {}, retrying", entry.seq);
                }
                Err(e) if e.is_retryable() && conflicts + 1 < retry::MAX_ATTEMPTS => {
                    conflicts += 1;
                    tracing::debug!("Conflict claiming position {}, retrying", entry.seq);
                    tokio::time::sleep(retry::backoff(conflicts)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a consumed entry.
    pub async fn delete(&self, seq: i64) -> Result<(), DbError> {
        let db = &self.db;
        let records: Vec<SeqRecord> = retry::on_conflict("queue delete", move || async move {
            let mut response = db
                .query("DELETE type::thing('queue', $seq) RETURN BEFORE")
                .bind(("seq", seq))
                .await?;
            let records: Vec<SeqRecord> = response.take(0)?;
            Ok::<_, DbError>(records)
        })
        .await?;

        if records.is_empty() {
            return Err(DbError::NotFound(format!("Queue entry not found: {}", seq)));
        }

        Ok(())
    }

    /// All entries in insertion order.
    pub async fn entries(&self) -> Result<Vec<QueueEntry>, DbError> {
        let mut response = self
            .db
            .query(format!("SELECT {} FROM queue ORDER BY seq ASC", ENTRY_FIELDS))
            .await?;

        let records: Vec<QueueEntry> = response.take(0)?;

        Ok(records)
    }

    /// Entries that were dequeued but never deleted.
    pub async fn claimed(&self) -> Result<Vec<QueueEntry>, DbError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM queue WHERE claimed_by != NONE ORDER BY seq ASC",
                ENTRY_FIELDS
            ))
            .await?;

        let records: Vec<QueueEntry> = response.take(0)?;

        Ok(records)
    }

    /// Number of entries, claimed or not.
    pub async fn len(&self) -> Result<usize, DbError> {
        let mut response = self
            .db
            .query("SELECT count() AS count FROM queue GROUP ALL")
            .await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let counts: Vec<CountResult> = response.take(0)?;

        Ok(counts.first().map_or(0, |c| c.count as usize))
    }

    pub async fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.len().await? == 0)
    }
}
