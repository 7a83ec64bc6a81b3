//! Persistent identifier counters.

use serde::Deserialize;

use crate::retry;
use crate::{Database, DbError};

#[derive(Deserialize)]
struct CounterRecord {
    value: i64,
}

/// Advance the named counter and return the new value.
///
/// The counter lives in the database, so values are never handed out twice,
/// including across restarts. Concurrent writers from other connections
/// lose a transaction conflict and try again.
pub(crate) async fn next_value(db: &Database, name: &'static str) -> Result<i64, DbError> {
    retry::on_conflict(name, move || advance(db, name)).await
}

async fn advance(db: &Database, name: &'static str) -> Result<i64, DbError> {
    let mut response = db
        .query("UPSERT type::thing('counter', $name) SET value = (value OR 0) + 1 RETURN AFTER")
        .bind(("name", name))
        .await?;

    let records: Vec<CounterRecord> = response.take(0)?;

    records
        .first()
        .map(|r| r.value)
        .ok_or_else(|| DbError::Query(format!("Counter {} did not advance", name)))
}
