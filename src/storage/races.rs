//! Race queries.
//!
//! Every function takes any SQLite executor so the same query can run
//! against the pool or inside a caller's transaction (`&mut *tx`).

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::storage::{time_from_millis, time_to_millis};
use crate::types::{CompetitorId, Race, RaceId, RaceStatus, Result};

const RACE_COLUMNS: &str = "id, name, start_time, status, winner_competitor_id";

fn race_from_row(row: &SqliteRow) -> Result<Race> {
    let status: String = row.try_get("status")?;
    let start_time: i64 = row.try_get("start_time")?;
    Ok(Race {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        start_time: time_from_millis("races.start_time", start_time)?,
        status: status.parse()?,
        winner_id: row.try_get("winner_competitor_id")?,
    })
}

/// Insert a new Scheduled race and return its id.
pub async fn insert_scheduled<'e, E>(exec: E, name: &str, start_time: DateTime<Utc>) -> Result<RaceId>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("INSERT INTO races (name, start_time, status) VALUES (?, ?, ?)")
        .bind(name)
        .bind(time_to_millis(start_time))
        .bind(RaceStatus::Scheduled.as_str())
        .execute(exec)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_race<'e, E>(exec: E, race_id: RaceId) -> Result<Option<Race>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {RACE_COLUMNS} FROM races WHERE id = ?");
    let row = sqlx::query(&sql).bind(race_id).fetch_optional(exec).await?;
    row.as_ref().map(race_from_row).transpose()
}

pub async fn race_status<'e, E>(exec: E, race_id: RaceId) -> Result<Option<RaceStatus>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM races WHERE id = ?")
        .bind(race_id)
        .fetch_optional(exec)
        .await?;
    status.map(|s| s.parse()).transpose()
}

/// All Scheduled or Running races, earliest start first.
pub async fn active_races<'e, E>(exec: E) -> Result<Vec<Race>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {RACE_COLUMNS} FROM races WHERE status IN (?, ?) ORDER BY start_time ASC, id ASC"
    );
    sqlx::query(&sql)
        .bind(RaceStatus::Scheduled.as_str())
        .bind(RaceStatus::Running.as_str())
        .fetch(exec)
        .map_err(Into::into)
        .and_then(|row| async move { race_from_row(&row) })
        .try_collect()
        .await
}

/// The race currently open for betting: the earliest Scheduled one.
pub async fn earliest_scheduled<'e, E>(exec: E) -> Result<Option<Race>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {RACE_COLUMNS} FROM races WHERE status = ? ORDER BY start_time ASC, id ASC LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(RaceStatus::Scheduled.as_str())
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(race_from_row).transpose()
}

/// The earliest Scheduled race whose start time is at or before `now`.
pub async fn earliest_due_scheduled<'e, E>(exec: E, now: DateTime<Utc>) -> Result<Option<Race>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {RACE_COLUMNS} FROM races WHERE status = ? AND start_time <= ? \
         ORDER BY start_time ASC, id ASC LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(RaceStatus::Scheduled.as_str())
        .bind(time_to_millis(now))
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(race_from_row).transpose()
}

/// `Scheduled → Running`, only if the race is still Scheduled.
/// Returns the number of rows changed (0 or 1).
pub async fn mark_running<'e, E>(exec: E, race_id: RaceId) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE races SET status = ? WHERE id = ? AND status = ?")
        .bind(RaceStatus::Running.as_str())
        .bind(race_id)
        .bind(RaceStatus::Scheduled.as_str())
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// `Running → Finished` with the winner recorded, only if still Running.
pub async fn mark_finished<'e, E>(exec: E, race_id: RaceId, winner: CompetitorId) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE races SET status = ?, winner_competitor_id = ? WHERE id = ? AND status = ?",
    )
    .bind(RaceStatus::Finished.as_str())
    .bind(winner)
    .bind(race_id)
    .bind(RaceStatus::Running.as_str())
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Delete Scheduled races dated after `cutoff` that nobody has bet on.
pub async fn delete_far_future_scheduled<'e, E>(exec: E, cutoff: DateTime<Utc>) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "DELETE FROM races WHERE status = ? AND start_time > ? \
         AND NOT EXISTS (SELECT 1 FROM wagers WHERE wagers.race_id = races.id)",
    )
    .bind(RaceStatus::Scheduled.as_str())
    .bind(time_to_millis(cutoff))
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Most recent races first.
pub async fn recent_races<'e, E>(exec: E, limit: i64) -> Result<Vec<Race>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {RACE_COLUMNS} FROM races ORDER BY start_time DESC, id DESC LIMIT ?");
    sqlx::query(&sql)
        .bind(limit)
        .fetch(exec)
        .map_err(Into::into)
        .and_then(|row| async move { race_from_row(&row) })
        .try_collect()
        .await
}
