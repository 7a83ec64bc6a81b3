//! Database connection management.

use job_core::{JobId, JobStatus};
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use thiserror::Error;

/// Database connection handle. Cloning is cheap and shares the engine.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection mode: "mem://", "file://path" or "rocksdb://path"
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "jobqueue".to_string(),
            database: "main".to_string(),
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for file-based persistence.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("file://{}", path.into()),
            ..Default::default()
        }
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Use an explicit endpoint string.
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Whether data survives a process restart.
    pub fn is_durable(&self) -> bool {
        !self.endpoint.starts_with("mem://") && self.endpoint != "memory"
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Schema missing: table `{0}` is not defined")]
    SchemaMissing(String),
    #[error("Connection error: {0}")]
    Connection(surrealdb::Error),
    /// Another transaction touched the same rows first; the statement was
    /// rolled back and can run again.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Job {id} is {actual}, expected one of {expected:?}")]
    StatusConflict {
        id: JobId,
        expected: Vec<JobStatus>,
        actual: JobStatus,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// The target row does not exist; the store itself is healthy.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// The statement lost a transaction conflict and nothing was written.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }

    /// The store is unreachable, misconfigured or rejected the statement.
    ///
    /// A conflict that is still unresolved after retrying counts too.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            DbError::SchemaMissing(_)
                | DbError::Connection(_)
                | DbError::Conflict(_)
                | DbError::Query(_)
        )
    }
}

/// Text SurrealDB attaches to a retryable commit failure, also when it is
/// wrapped into a "query not executed" error.
const RETRYABLE_MARKER: &str = "This transaction can be retried";

impl From<surrealdb::Error> for DbError {
    fn from(err: surrealdb::Error) -> Self {
        let retryable = matches!(
            err,
            surrealdb::Error::Db(surrealdb::error::Db::TxRetryable)
        ) || err.to_string().contains(RETRYABLE_MARKER);

        if retryable {
            DbError::Conflict(err.to_string())
        } else {
            DbError::Connection(err)
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Open a database connection.
pub async fn connect(config: &DbConfig) -> Result<Database, DbError> {
    tracing::info!("Connecting to database: {}", config.endpoint);

    let db = connect_any(&config.endpoint).await?;

    // Select namespace and database
    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await?;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );

    Ok(db)
}
