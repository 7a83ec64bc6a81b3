//! SurrealDB integration for the job queue system.
//!
//! This crate provides database connectivity and the two repositories the
//! rest of the system is built on: the job record store and the FIFO queue.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod counter;
mod retry;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::{TABLES, init_schema, verify_schema};

/// Connect and initialize the schema.
///
/// This should be called once at application startup.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
