//! Wager and wager-status queries.
//!
//! Status ids come from the `wager_statuses` lookup table. A missing row
//! there is a configuration error, never a per-wager one.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::storage::{decimal_from_text, decimal_to_text, time_from_millis, time_to_millis};
use crate::types::{
    CompetitorId, RaceId, Result, ScrambleError, UserId, Wager, WagerId, WagerStatus,
};

/// Resolve the lookup-table id for a status name.
pub async fn status_id<'e, E>(exec: E, status: WagerStatus) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT id FROM wager_statuses WHERE name = ?")
        .bind(status.as_str())
        .fetch_optional(exec)
        .await?
        .ok_or_else(|| {
            ScrambleError::Config(format!("wager status '{status}' missing from wager_statuses"))
        })
}

/// Fields of a wager about to be inserted.
#[derive(Debug, Clone)]
pub struct NewWager {
    pub user_id: UserId,
    pub race_id: RaceId,
    pub competitor_id: CompetitorId,
    pub stake: Decimal,
    pub potential_payout: Decimal,
    pub placed_at: DateTime<Utc>,
}

pub async fn insert_wager<'e, E>(exec: E, wager: &NewWager, pending_status_id: i64) -> Result<WagerId>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO wagers \
         (user_id, race_id, competitor_id, stake, status_id, potential_payout, actual_payout, placed_at) \
         VALUES (?, ?, ?, ?, ?, ?, '0', ?)",
    )
    .bind(wager.user_id)
    .bind(wager.race_id)
    .bind(wager.competitor_id)
    .bind(decimal_to_text(wager.stake))
    .bind(pending_status_id)
    .bind(decimal_to_text(wager.potential_payout))
    .bind(time_to_millis(wager.placed_at))
    .execute(exec)
    .await?;
    Ok(result.last_insert_rowid())
}

/// A Pending wager joined with its competitor's odds.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWager {
    pub id: WagerId,
    pub user_id: UserId,
    pub competitor_id: CompetitorId,
    pub stake: Decimal,
    pub odds: Decimal,
}

/// All wagers on `race_id` still in the Pending status, oldest first.
pub async fn pending_for_race<'e, E>(
    exec: E,
    race_id: RaceId,
    pending_status_id: i64,
) -> Result<Vec<PendingWager>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "SELECT w.id, w.user_id, w.competitor_id, w.stake, c.odds \
         FROM wagers w JOIN competitors c ON w.competitor_id = c.id \
         WHERE w.race_id = ? AND w.status_id = ? ORDER BY w.id",
    )
    .bind(race_id)
    .bind(pending_status_id)
    .fetch(exec)
    .map_err(Into::into)
    .and_then(|row| async move { pending_from_row(&row) })
    .try_collect()
    .await
}

fn pending_from_row(row: &SqliteRow) -> Result<PendingWager> {
    let stake: String = row.try_get("stake")?;
    let odds: String = row.try_get("odds")?;
    Ok(PendingWager {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        competitor_id: row.try_get("competitor_id")?,
        stake: decimal_from_text("wagers.stake", &stake)?,
        odds: decimal_from_text("competitors.odds", &odds)?,
    })
}

/// Move a wager out of Pending. The `status_id = pending` predicate makes
/// a second settlement of the same wager a zero-row update.
pub async fn settle_wager<'e, E>(
    exec: E,
    wager_id: WagerId,
    pending_status_id: i64,
    new_status_id: i64,
    actual_payout: Decimal,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE wagers SET status_id = ?, actual_payout = ? WHERE id = ? AND status_id = ?",
    )
    .bind(new_status_id)
    .bind(decimal_to_text(actual_payout))
    .bind(wager_id)
    .bind(pending_status_id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

const WAGER_SELECT: &str = "SELECT w.id, w.user_id, w.race_id, w.competitor_id, w.stake, \
     s.name AS status, w.potential_payout, w.actual_payout, w.placed_at \
     FROM wagers w JOIN wager_statuses s ON w.status_id = s.id";

fn wager_from_row(row: &SqliteRow) -> Result<Wager> {
    let stake: String = row.try_get("stake")?;
    let status: String = row.try_get("status")?;
    let potential: String = row.try_get("potential_payout")?;
    let actual: String = row.try_get("actual_payout")?;
    let placed_at: i64 = row.try_get("placed_at")?;
    Ok(Wager {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        race_id: row.try_get("race_id")?,
        competitor_id: row.try_get("competitor_id")?,
        stake: decimal_from_text("wagers.stake", &stake)?,
        status: status.parse()?,
        potential_payout: decimal_from_text("wagers.potential_payout", &potential)?,
        actual_payout: decimal_from_text("wagers.actual_payout", &actual)?,
        placed_at: time_from_millis("wagers.placed_at", placed_at)?,
    })
}

pub async fn get_wager<'e, E>(exec: E, wager_id: WagerId) -> Result<Option<Wager>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{WAGER_SELECT} WHERE w.id = ?");
    let row = sqlx::query(&sql).bind(wager_id).fetch_optional(exec).await?;
    row.as_ref().map(wager_from_row).transpose()
}

/// A user's wagers, newest first.
pub async fn wagers_for_user<'e, E>(exec: E, user_id: UserId, limit: i64) -> Result<Vec<Wager>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{WAGER_SELECT} WHERE w.user_id = ? ORDER BY w.id DESC LIMIT ?");
    sqlx::query(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch(exec)
        .map_err(Into::into)
        .and_then(|row| async move { wager_from_row(&row) })
        .try_collect()
        .await
}

pub async fn wagers_for_race<'e, E>(exec: E, race_id: RaceId) -> Result<Vec<Wager>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{WAGER_SELECT} WHERE w.race_id = ? ORDER BY w.id");
    sqlx::query(&sql)
        .bind(race_id)
        .fetch(exec)
        .map_err(Into::into)
        .and_then(|row| async move { wager_from_row(&row) })
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{connect_in_memory, races, schema, users};
    use rust_decimal_macros::dec;
    use sqlx::SqlitePool;

    async fn setup() -> (SqlitePool, UserId, RaceId) {
        let pool = connect_in_memory().await.unwrap();
        schema::ensure_schema(&pool).await.unwrap();
        sqlx::query("INSERT INTO competitors (id, name, odds, lane) VALUES (1, 'Henrietta', '2.5', 10)")
            .execute(&pool)
            .await
            .unwrap();
        let user = users::insert_user(&pool, "alice", dec!(100)).await.unwrap();
        let race = races::insert_scheduled(&pool, "Cosmic Cup #3", Utc::now()).await.unwrap();
        (pool, user, race)
    }

    fn new_wager(user_id: UserId, race_id: RaceId) -> NewWager {
        NewWager {
            user_id,
            race_id,
            competitor_id: 1,
            stake: dec!(20),
            potential_payout: dec!(50),
            placed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_status_ids_resolve() {
        let (pool, _, _) = setup().await;
        let pending = status_id(&pool, WagerStatus::Pending).await.unwrap();
        let won = status_id(&pool, WagerStatus::Won).await.unwrap();
        assert_ne!(pending, won);
    }

    #[tokio::test]
    async fn test_missing_status_is_config_error() {
        let (pool, _, _) = setup().await;
        sqlx::query("DELETE FROM wager_statuses WHERE name = 'Lost'")
            .execute(&pool)
            .await
            .unwrap();
        let err = status_id(&pool, WagerStatus::Lost).await.unwrap_err();
        assert!(matches!(err, ScrambleError::Config(_)));
    }

    #[tokio::test]
    async fn test_insert_and_list_pending() {
        let (pool, user, race) = setup().await;
        let pending = status_id(&pool, WagerStatus::Pending).await.unwrap();
        let id = insert_wager(&pool, &new_wager(user, race), pending).await.unwrap();

        let open = pending_for_race(&pool, race, pending).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
        assert_eq!(open[0].odds, dec!(2.5));

        let wager = get_wager(&pool, id).await.unwrap().unwrap();
        assert_eq!(wager.status, WagerStatus::Pending);
        assert_eq!(wager.actual_payout, Decimal::ZERO);
        assert_eq!(wager.potential_payout, dec!(50));
    }

    #[tokio::test]
    async fn test_settle_wager_only_once() {
        let (pool, user, race) = setup().await;
        let pending = status_id(&pool, WagerStatus::Pending).await.unwrap();
        let won = status_id(&pool, WagerStatus::Won).await.unwrap();
        let id = insert_wager(&pool, &new_wager(user, race), pending).await.unwrap();

        assert_eq!(settle_wager(&pool, id, pending, won, dec!(50)).await.unwrap(), 1);
        assert_eq!(settle_wager(&pool, id, pending, won, dec!(50)).await.unwrap(), 0);

        let wager = get_wager(&pool, id).await.unwrap().unwrap();
        assert_eq!(wager.status, WagerStatus::Won);
        assert_eq!(wager.actual_payout, dec!(50));
        assert!(pending_for_race(&pool, race, pending).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_list_stops_at_corrupt_row() {
        let (pool, user, race) = setup().await;
        let pending = status_id(&pool, WagerStatus::Pending).await.unwrap();
        insert_wager(&pool, &new_wager(user, race), pending).await.unwrap();
        let bad = insert_wager(&pool, &new_wager(user, race), pending).await.unwrap();
        sqlx::query("UPDATE wagers SET stake = 'twenty' WHERE id = ?")
            .bind(bad)
            .execute(&pool)
            .await
            .unwrap();

        let err = pending_for_race(&pool, race, pending).await.unwrap_err();
        assert!(matches!(err, ScrambleError::CorruptRow(_)));
    }

    #[tokio::test]
    async fn test_wagers_for_user_newest_first() {
        let (pool, user, race) = setup().await;
        let pending = status_id(&pool, WagerStatus::Pending).await.unwrap();
        let first = insert_wager(&pool, &new_wager(user, race), pending).await.unwrap();
        let second = insert_wager(&pool, &new_wager(user, race), pending).await.unwrap();

        let listed = wagers_for_user(&pool, user, 10).await.unwrap();
        assert_eq!(listed.iter().map(|w| w.id).collect::<Vec<_>>(), vec![second, first]);
        assert_eq!(wagers_for_race(&pool, race).await.unwrap().len(), 2);
    }
}
