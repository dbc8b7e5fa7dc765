//! Competitor roster queries.

use sqlx::{Row, SqlitePool};

use crate::storage::decimal_from_text;
use crate::types::{Competitor, Result, Roster};

/// Load the full roster ordered by lane.
///
/// Fails with a configuration error when the table is empty.
pub async fn load_roster(pool: &SqlitePool) -> Result<Roster> {
    let rows = sqlx::query("SELECT id, name, odds, lane, colour FROM competitors ORDER BY lane, id")
        .fetch_all(pool)
        .await?;

    let mut competitors = Vec::with_capacity(rows.len());
    for row in rows {
        let odds: String = row.try_get("odds")?;
        competitors.push(Competitor {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            odds: decimal_from_text("competitors.odds", &odds)?,
            lane: row.try_get("lane")?,
            colour: row.try_get("colour")?,
        });
    }
    Roster::new(competitors)
}
