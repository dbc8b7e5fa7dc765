//! Persistence layer.
//!
//! SQLite through `sqlx`. The store is the durable source of truth for
//! races, users, wagers and the competitor roster; the engine's in-memory
//! race state is only a cache over it.
//!
//! Amounts are stored as canonical decimal TEXT and times as epoch
//! milliseconds so that nothing round-trips through a float.

pub mod competitors;
pub mod races;
pub mod schema;
pub mod users;
pub mod wagers;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::types::{Result, ScrambleError};

/// Open a pool against the given SQLite URL, creating the file if needed.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    info!(url, max_connections, "Store connected");
    Ok(pool)
}

/// Private in-memory database on a single pinned connection.
///
/// Every query shares that one connection, so callers must never reach for
/// the pool while holding a transaction from it.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Begin a transaction that takes the write lock up front.
///
/// A deferred transaction that reads before it writes cannot wait out a
/// competing writer: SQLite fails its lock upgrade with `SQLITE_BUSY`
/// immediately. `BEGIN IMMEDIATE` queues on the busy timeout instead.
pub async fn begin_immediate(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

pub(crate) fn decimal_to_text(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn decimal_from_text(column: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| ScrambleError::CorruptRow(format!("{column} = '{raw}': {e}")))
}

pub(crate) fn time_to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn time_from_millis(column: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ScrambleError::CorruptRow(format!("{column} = {millis} is out of range")))
}
