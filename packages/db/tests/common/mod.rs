#![allow(dead_code)]

use db::repositories::{JobRepository, QueueRepository};
use db::{Database, DbConfig, DbError};

/// A fresh in-memory database with the schema applied.
///
/// Every call gets its own engine, so tests never see each other's rows.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}

pub async fn setup_repos() -> Result<(JobRepository, QueueRepository), DbError> {
    let db = setup_db().await?;
    Ok((
        JobRepository::open(db.clone()).await?,
        QueueRepository::open(db).await?,
    ))
}
