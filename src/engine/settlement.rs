//! Settlement engine — winner selection and payout of pending wagers.
//!
//! Settlement runs strictly inside the caller's transaction: it never
//! begins or commits one. The race-finish update and every wager/balance
//! change therefore commit or roll back together.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::storage::{users, wagers};
use crate::types::{
    winning_payout, Competitor, CompetitorId, RaceId, Result, Roster, ScrambleError, WagerStatus,
};

// ---------------------------------------------------------------------------
// Winner selection
// ---------------------------------------------------------------------------

/// Picks the winning competitor of a race.
#[cfg_attr(test, mockall::automock)]
pub trait WinnerSelector: Send + Sync {
    /// Return the id of the winner, or `None` if the roster gives no choice.
    fn select(&self, roster: &Roster) -> Option<CompetitorId>;
}

/// Uniform choice over the roster from an owned, seedable generator.
pub struct RandomWinner {
    rng: Mutex<StdRng>,
}

impl RandomWinner {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl WinnerSelector for RandomWinner {
    fn select(&self, roster: &Roster) -> Option<CompetitorId> {
        let competitors = roster.competitors();
        if competitors.is_empty() {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = rng.gen_range(0..competitors.len());
        Some(competitors[index].id)
    }
}

// ---------------------------------------------------------------------------
// Settlement report
// ---------------------------------------------------------------------------

/// Outcome of settling one race.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    pub race_id: RaceId,
    pub winner_id: CompetitorId,
    pub wagers_won: usize,
    pub wagers_lost: usize,
    /// Sum of all winning payouts credited to balances.
    pub total_paid: Decimal,
    /// Sum of all stakes on losing competitors.
    pub total_forfeited: Decimal,
}

impl SettlementReport {
    pub fn wagers_settled(&self) -> usize {
        self.wagers_won + self.wagers_lost
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    selector: Arc<dyn WinnerSelector>,
}

impl SettlementEngine {
    pub fn new(selector: Arc<dyn WinnerSelector>) -> Self {
        Self { selector }
    }

    /// Choose the winner for a race from the roster.
    pub fn pick_winner<'r>(&self, roster: &'r Roster) -> Result<&'r Competitor> {
        let id = self
            .selector
            .select(roster)
            .ok_or_else(|| ScrambleError::Config("no competitor available to win".into()))?;
        roster.get(id).ok_or_else(|| {
            ScrambleError::Config(format!("winner selector chose unknown competitor {id}"))
        })
    }

    /// Settle every Pending wager on `race_id` against `winner_id`.
    ///
    /// Winners are credited `stake + stake × (odds − 1)` and marked Won;
    /// everyone else is marked Lost with a zero payout (their stake was
    /// debited when the wager was placed). Any failure returns an error and
    /// leaves the rollback to the caller's transaction.
    pub async fn settle(
        &self,
        conn: &mut SqliteConnection,
        race_id: RaceId,
        winner_id: CompetitorId,
    ) -> Result<SettlementReport> {
        let pending_id = wagers::status_id(&mut *conn, WagerStatus::Pending).await?;
        let won_id = wagers::status_id(&mut *conn, WagerStatus::Won).await?;
        let lost_id = wagers::status_id(&mut *conn, WagerStatus::Lost).await?;

        let pending = wagers::pending_for_race(&mut *conn, race_id, pending_id).await?;

        let mut report = SettlementReport {
            race_id,
            winner_id,
            ..Default::default()
        };

        for wager in pending {
            let (status_id, payout) = if wager.competitor_id == winner_id {
                let payout = winning_payout(wager.stake, wager.odds)?;
                let balance = users::balance(&mut *conn, wager.user_id)
                    .await?
                    .ok_or(ScrambleError::UserNotFound(wager.user_id))?;
                let credited = balance
                    .checked_add(payout)
                    .ok_or(ScrambleError::BalanceOverflow(wager.user_id))?;
                let updated = users::set_balance(&mut *conn, wager.user_id, credited).await?;
                if updated != 1 {
                    return Err(ScrambleError::UserNotFound(wager.user_id));
                }
                debug!(
                    wager_id = wager.id,
                    user_id = wager.user_id,
                    stake = %wager.stake,
                    odds = %wager.odds,
                    payout = %payout,
                    "Wager won"
                );
                report.wagers_won += 1;
                report.total_paid = report.total_paid.saturating_add(payout);
                (won_id, payout)
            } else {
                debug!(wager_id = wager.id, user_id = wager.user_id, "Wager lost");
                report.wagers_lost += 1;
                report.total_forfeited = report.total_forfeited.saturating_add(wager.stake);
                (lost_id, Decimal::ZERO)
            };

            let updated = wagers::settle_wager(&mut *conn, wager.id, pending_id, status_id, payout).await?;
            if updated != 1 {
                return Err(ScrambleError::Conflict(format!(
                    "wager {} left Pending during settlement",
                    wager.id
                )));
            }
        }

        info!(
            race_id,
            winner_id,
            won = report.wagers_won,
            lost = report.wagers_lost,
            paid = %report.total_paid,
            "Race settled"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
