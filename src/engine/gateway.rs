//! Wager gateway — validates and records one stake against the open race.
//!
//! The balance debit and the wager insert share one transaction, so a
//! debit is never persisted without its wager row or the other way round.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::wagers::NewWager;
use crate::storage::{begin_immediate, races, users, wagers};
use crate::types::{
    Competitor, CompetitorId, Race, RaceId, RaceStatus, Result, Roster, ScrambleError, UserId,
    WagerId, WagerStatus,
};

/// Stakes are currency amounts: at most this many decimal places.
pub const MAX_STAKE_SCALE: u32 = 2;

/// A bettor's request to stake on one competitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerRequest {
    pub user_id: UserId,
    pub stake: Decimal,
    pub competitor_id: CompetitorId,
}

/// Confirmation returned for a recorded wager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerReceipt {
    pub wager_id: WagerId,
    pub race_id: RaceId,
    pub competitor_name: String,
    pub stake: Decimal,
    pub potential_payout: Decimal,
    pub new_balance: Decimal,
}

pub struct WagerGateway {
    pool: SqlitePool,
    roster: Arc<Roster>,
}

impl WagerGateway {
    pub fn new(pool: SqlitePool, roster: Arc<Roster>) -> Self {
        Self { pool, roster }
    }

    /// The race open for betting: the earliest Scheduled one.
    ///
    /// With nothing Scheduled, a Running race means betting has closed for
    /// it; otherwise there is simply no open race.
    pub async fn active_race_for_betting(&self) -> Result<Race> {
        if let Some(race) = races::earliest_scheduled(&self.pool).await? {
            return Ok(race);
        }
        let active = races::active_races(&self.pool).await?;
        match active.iter().find(|r| r.status == RaceStatus::Running) {
            Some(running) => Err(ScrambleError::BettingClosed(running.id)),
            None => Err(ScrambleError::NoOpenRace),
        }
    }

    /// Amount shown before a wager is placed: `stake × odds`.
    pub fn preview_payout(&self, competitor_id: CompetitorId, stake: Decimal) -> Result<Decimal> {
        validate_stake(stake)?;
        self.competitor(competitor_id)?.potential_payout(stake)
    }

    /// Validate and record a wager, debiting the stake.
    ///
    /// Checks run in a fixed order and each failure is distinct: stake,
    /// competitor, open race, race still Scheduled inside the transaction,
    /// then funds.
    pub async fn place_wager(&self, request: &WagerRequest) -> Result<WagerReceipt> {
        validate_stake(request.stake)?;
        let competitor = self.competitor(request.competitor_id)?;
        let race = self.active_race_for_betting().await?;
        self.place_on_race(race.id, competitor, request).await
    }

    fn competitor(&self, competitor_id: CompetitorId) -> Result<&Competitor> {
        self.roster
            .get(competitor_id)
            .ok_or(ScrambleError::UnknownCompetitor(competitor_id))
    }

    /// The transactional half of [`place_wager`](Self::place_wager), for a
    /// race already chosen by the caller.
    pub(crate) async fn place_on_race(
        &self,
        race_id: RaceId,
        competitor: &Competitor,
        request: &WagerRequest,
    ) -> Result<WagerReceipt> {
        let potential_payout = competitor.potential_payout(request.stake)?;
        let mut tx = begin_immediate(&self.pool).await?;

        // The race may have started since it was looked up.
        match races::race_status(&mut *tx, race_id).await? {
            Some(RaceStatus::Scheduled) => {}
            Some(status) => {
                debug!(race_id, %status, "Betting closed, race no longer Scheduled");
                return Err(ScrambleError::BettingClosed(race_id));
            }
            None => return Err(ScrambleError::NoOpenRace),
        }

        let available = users::balance(&mut *tx, request.user_id)
            .await?
            .ok_or(ScrambleError::UserNotFound(request.user_id))?;
        if available < request.stake {
            debug!(
                user_id = request.user_id,
                stake = %request.stake,
                balance = %available,
                "Insufficient funds"
            );
            return Err(ScrambleError::InsufficientFunds {
                needed: request.stake,
                available,
            });
        }

        let pending_id = wagers::status_id(&mut *tx, WagerStatus::Pending).await?;
        let new_balance = available - request.stake;
        users::set_balance(&mut *tx, request.user_id, new_balance).await?;

        let wager = NewWager {
            user_id: request.user_id,
            race_id,
            competitor_id: competitor.id,
            stake: request.stake,
            potential_payout,
            placed_at: Utc::now(),
        };
        let wager_id = wagers::insert_wager(&mut *tx, &wager, pending_id).await?;
        tx.commit().await?;

        info!(
            wager_id,
            user_id = request.user_id,
            race_id,
            competitor = %competitor.name,
            stake = %request.stake,
            new_balance = %new_balance,
            "Wager placed"
        );
        Ok(WagerReceipt {
            wager_id,
            race_id,
            competitor_name: competitor.name.clone(),
            stake: request.stake,
            potential_payout,
            new_balance,
        })
    }
}

fn validate_stake(stake: Decimal) -> Result<()> {
    if stake <= Decimal::ZERO {
        return Err(ScrambleError::InvalidStake(format!("{stake} is not positive")));
    }
    if stake.normalize().scale() > MAX_STAKE_SCALE {
        return Err(ScrambleError::InvalidStake(format!(
            "{stake} has more than {MAX_STAKE_SCALE} decimal places"
        )));
    }
    Ok(())
}
