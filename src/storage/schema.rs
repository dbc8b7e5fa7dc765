//! Schema bootstrap and seeding.
//!
//! Creates the tables idempotently and fills the static lookup data
//! (wager statuses, roster, demo users) when the tables are empty.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::{RosterEntry, SeedUser};
use crate::storage::decimal_to_text;
use crate::types::{Result, WagerStatus};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS competitors (
        id     INTEGER PRIMARY KEY AUTOINCREMENT,
        name   TEXT NOT NULL UNIQUE,
        odds   TEXT NOT NULL,
        lane   INTEGER NOT NULL,
        colour TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT NOT NULL,
        balance TEXT NOT NULL DEFAULT '0'
    )",
    "CREATE TABLE IF NOT EXISTS races (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        name                 TEXT NOT NULL,
        start_time           INTEGER NOT NULL,
        status               TEXT NOT NULL
                             CHECK (status IN ('Scheduled', 'Running', 'Finished')),
        winner_competitor_id INTEGER REFERENCES competitors(id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_races_status_start ON races(status, start_time)",
    "CREATE TABLE IF NOT EXISTS wager_statuses (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS wagers (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id          INTEGER NOT NULL REFERENCES users(id),
        race_id          INTEGER NOT NULL REFERENCES races(id),
        competitor_id    INTEGER NOT NULL REFERENCES competitors(id),
        stake            TEXT NOT NULL,
        status_id        INTEGER NOT NULL REFERENCES wager_statuses(id),
        potential_payout TEXT NOT NULL,
        actual_payout    TEXT NOT NULL DEFAULT '0',
        placed_at        INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_wagers_race_status ON wagers(race_id, status_id)",
    "CREATE INDEX IF NOT EXISTS idx_wagers_user ON wagers(user_id)",
];

/// Create all tables and seed the wager status lookup rows.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    for status in [WagerStatus::Pending, WagerStatus::Won, WagerStatus::Lost] {
        sqlx::query("INSERT OR IGNORE INTO wager_statuses (name) VALUES (?)")
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    debug!("Schema verified");
    Ok(())
}

/// Insert the configured roster if no competitors exist yet.
/// Returns the number of rows inserted.
pub async fn seed_roster(pool: &SqlitePool, entries: &[RosterEntry]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM competitors")
        .fetch_one(&mut *tx)
        .await?;
    if existing > 0 {
        return Ok(0);
    }

    for entry in entries {
        sqlx::query("INSERT INTO competitors (name, odds, lane, colour) VALUES (?, ?, ?, ?)")
            .bind(&entry.name)
            .bind(decimal_to_text(entry.odds))
            .bind(entry.lane)
            .bind(&entry.colour)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(count = entries.len(), "Roster seeded");
    Ok(entries.len())
}

/// Insert the configured users if the user table is empty.
pub async fn seed_users(pool: &SqlitePool, users: &[SeedUser]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    if existing > 0 {
        return Ok(0);
    }

    for user in users {
        sqlx::query("INSERT INTO users (name, balance) VALUES (?, ?)")
            .bind(&user.name)
            .bind(decimal_to_text(user.balance))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(count = users.len(), "Users seeded");
    Ok(users.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connect_in_memory;
    use rust_decimal_macros::dec;

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry { name: "Henrietta".into(), odds: dec!(2.5), lane: 10, colour: "red".into() },
            RosterEntry { name: "Foghorn".into(), odds: dec!(4.0), lane: 90, colour: "green".into() },
        ]
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();

        let statuses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wager_statuses")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(statuses, 3);
    }

    #[tokio::test]
    async fn test_seed_roster_only_once() {
        let pool = connect_in_memory().await.unwrap();
        ensure_schema(&pool).await.unwrap();

        assert_eq!(seed_roster(&pool, &roster()).await.unwrap(), 2);
        assert_eq!(seed_roster(&pool, &roster()).await.unwrap(), 0);

        let odds: String = sqlx::query_scalar("SELECT odds FROM competitors WHERE name = 'Henrietta'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(odds, "2.5");
    }

    #[tokio::test]
    async fn test_seed_users() {
        let pool = connect_in_memory().await.unwrap();
        ensure_schema(&pool).await.unwrap();

        let users = vec![SeedUser { name: "demo".into(), balance: dec!(100) }];
        assert_eq!(seed_users(&pool, &users).await.unwrap(), 1);
        assert_eq!(seed_users(&pool, &users).await.unwrap(), 0);
    }
}
