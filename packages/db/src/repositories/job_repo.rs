//! Job repository: the durable record store.

use std::sync::Arc;

use job_core::{Job, JobId, JobStatus, NewJob};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::counter;
use crate::retry;
use crate::schema::verify_schema;
use crate::{Database, DbError};

/// Projection that maps a stored row onto [`Job`].
const JOB_FIELDS: &str =
    "record::id(id) AS id, request, resource, action, status, error, created_at, updated_at";

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
    /// Serialises id allocation within this process.
    alloc: Arc<Mutex<()>>,
}

/// Struct for creating jobs - omits datetime fields to use SurrealDB defaults.
#[derive(Debug, Clone, Serialize)]
struct JobCreate {
    request: String,
    resource: String,
    action: String,
    status: JobStatus,
}

#[derive(Deserialize)]
struct StatusRecord {
    status: JobStatus,
}

/// A partial job record for [`JobRepository::update`].
///
/// Only fields that are set are written. `error: Some(None)` clears the
/// error. A non-empty `expect_status` turns the write into a conditional
/// update that only applies while the row is in one of those states.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPatch {
    pub id: JobId,
    pub action: Option<String>,
    pub status: Option<JobStatus>,
    pub error: Option<Option<String>>,
    pub expect_status: Vec<JobStatus>,
}

impl JobPatch {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            action: None,
            status: None,
            error: None,
            expect_status: Vec::new(),
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    /// Only apply while the stored status is one of `statuses`.
    pub fn expecting(mut self, statuses: &[JobStatus]) -> Self {
        self.expect_status = statuses.to_vec();
        self
    }

    /// Build the SET/WHERE clauses and their bindings.
    fn to_query(&self) -> (String, Vec<(&'static str, Value)>) {
        let mut sets = Vec::new();
        let mut bindings: Vec<(&'static str, Value)> = vec![("id", Value::from(self.id.0))];

        if let Some(action) = &self.action {
            sets.push("action = $action");
            bindings.push(("action", Value::from(action.clone())));
        }
        if let Some(status) = self.status {
            sets.push("status = $status");
            bindings.push(("status", Value::from(status.code())));
        }
        match &self.error {
            Some(Some(error)) => {
                sets.push("error = $error");
                bindings.push(("error", Value::from(error.clone())));
            }
            Some(None) => sets.push("error = NONE"),
            None => {}
        }
        sets.push("updated_at = time::now()");

        let where_clause = if self.expect_status.is_empty() {
            String::new()
        } else {
            let codes: Vec<i64> = self.expect_status.iter().map(|s| s.code()).collect();
            bindings.push(("expected", Value::from(codes)));
            "WHERE status IN $expected".to_string()
        };

        let query = format!(
            "UPDATE type::thing('job', $id) SET {} {} RETURN AFTER",
            sets.join(", "),
            where_clause
        );

        (query, bindings)
    }
}

impl JobRepository {
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

    /// Store a new job and return its freshly assigned id.
    pub async fn insert(&self, job: &NewJob) -> Result<JobId, DbError> {
        let content = JobCreate {
            request: job.request.clone(),
            resource: job.resource.clone(),
            action: job.action.clone(),
            status: job.status,
        };

        let _guard = self.alloc.lock().await;
        let id = counter::next_value(&self.db, "job").await?;

        let db = &self.db;
        retry::on_conflict("job insert", move || {
            let content = content.clone();
            async move {
                db.query("CREATE type::thing('job', $id) CONTENT $content RETURN NONE")
                    .bind(("id", id))
                    .bind(("content", content))
                    .await?
                    .check()?;
                Ok::<_, DbError>(())
            }
        })
        .await?;

        tracing::debug!("Inserted job {} ({} {})", id, job.action, job.resource);

        Ok(JobId(id))
    }

    /// Get a job by ID.
    pub async fn find_one(&self, id: JobId) -> Result<Job, DbError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM type::thing('job', $id)",
                JOB_FIELDS
            ))
            .bind(("id", id.0))
            .await?;

        let records: Vec<Job> = response.take(0)?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// Check if a job exists.
    pub async fn exists(&self, id: JobId) -> Result<bool, DbError> {
        match self.find_one(id).await {
            Ok(_) => Ok(true),
            Err(DbError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Overwrite the fields present in `patch` and return the updated job.
    ///
    /// Fails with `NotFound` when the id does not exist and with
    /// `StatusConflict` when the precondition does not hold; in both cases
    /// nothing is written.
    pub async fn update(&self, patch: &JobPatch) -> Result<Job, DbError> {
        let (query, bindings) = patch.to_query();

        let db = &self.db;
        let (query, bindings) = (&query, &bindings);
        let touched: Vec<StatusRecord> = retry::on_conflict("job update", move || async move {
            let mut result = db.query(query.as_str());
            for (name, value) in bindings {
                result = result.bind((*name, value.clone()));
            }
            let mut response = result.await?;
            let touched: Vec<StatusRecord> = response.take(0)?;
            Ok::<_, DbError>(touched)
        })
        .await?;

        if touched.is_empty() {
            let current = self.find_one(patch.id).await?;
            return Err(DbError::StatusConflict {
                id: patch.id,
                expected: patch.expect_status.clone(),
                actual: current.status,
            });
        }

        tracing::debug!(
            "Updated job {} (status {})",
            patch.id,
            touched[0].status
        );

        self.find_one(patch.id).await
    }

    /// List jobs, optionally by status, oldest first.
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<Job>, DbError> {
        let where_clause = if status.is_some() {
            "WHERE status = $status"
        } else {
            ""
        };
        let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();

        let query = format!(
            "SELECT {} FROM job {} ORDER BY id ASC {}",
            JOB_FIELDS, where_clause, limit_clause
        );

        let mut result = self.db.query(&query);
        if let Some(status) = status {
            result = result.bind(("status", status.code()));
        }

        let mut response = result.await?;
        let records: Vec<Job> = response.take(0)?;

        Ok(records)
    }

    /// Count jobs per status.
    pub async fn count_by_status(
        &self,
    ) -> Result<std::collections::HashMap<JobStatus, u64>, DbError> {
        let mut response = self
            .db
            .query("SELECT status, count() AS count FROM job GROUP BY status")
            .await?;

        #[derive(Deserialize)]
        struct StatusCount {
            status: i64,
            count: i64,
        }

        let counts: Vec<StatusCount> = response.take(0)?;

        let mut map = std::collections::HashMap::new();
        for count in counts {
            let status = JobStatus::from_code(count.status)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            map.insert(status, count.count as u64);
        }

        Ok(map)
    }
}
