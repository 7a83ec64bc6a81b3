//! Database schema definitions using SurrealQL.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{Database, DbError};

/// Tables the repositories depend on.
pub const TABLES: [&str; 3] = ["job", "queue", "counter"];

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes. Safe to run on
/// every start.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    // Identifier counters
    db.query(COUNTER_SCHEMA).await?.check()?;

    // Job table
    db.query(JOB_SCHEMA).await?.check()?;

    // Queue table
    db.query(QUEUE_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Check that every table the repositories need is defined.
pub async fn verify_schema(db: &Database) -> Result<(), DbError> {
    #[derive(Deserialize)]
    struct DbInfo {
        #[serde(default)]
        tables: BTreeMap<String, serde_json::Value>,
    }

    let mut response = db.query("INFO FOR DB").await?;
    let info: Option<DbInfo> = response.take(0)?;
    let tables = info.map(|i| i.tables).unwrap_or_default();

    for table in TABLES {
        if !tables.contains_key(table) {
            return Err(DbError::SchemaMissing(table.to_string()));
        }
    }

    Ok(())
}

/// Counter table: one row per identifier space, holding the last value
/// handed out.
const COUNTER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS counter SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS value ON counter TYPE int DEFAULT 0;
"#;

/// Job table schema.
const JOB_SCHEMA: &str = r#"
-- Job records, keyed by integer id (job:1, job:2, ...)
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS request ON job TYPE string;
DEFINE FIELD IF NOT EXISTS resource ON job TYPE string;
DEFINE FIELD IF NOT EXISTS action ON job TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job TYPE int DEFAULT 0 ASSERT $value IN [0, 1, 2, 3];
DEFINE FIELD IF NOT EXISTS error ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE datetime DEFAULT time::now();
DEFINE FIELD IF NOT EXISTS updated_at ON job TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_resource ON job FIELDS resource;
"#;

/// Queue table schema.
const QUEUE_SCHEMA: &str = r#"
-- FIFO entries pointing at job records (queue:<seq>)
DEFINE TABLE IF NOT EXISTS queue SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS seq ON queue TYPE int;
DEFINE FIELD IF NOT EXISTS job_id ON queue TYPE int;
DEFINE FIELD IF NOT EXISTS claimed_by ON queue TYPE option<string>;
DEFINE FIELD IF NOT EXISTS claimed_at ON queue TYPE option<datetime>;
DEFINE FIELD IF NOT EXISTS enqueued_at ON queue TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS queue_seq ON queue FIELDS seq UNIQUE;
DEFINE INDEX IF NOT EXISTS queue_job ON queue FIELDS job_id;
"#;
