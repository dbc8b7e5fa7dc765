//! Shared types for the SCRAMBLE race service.
//!
//! These types form the data model used across the storage, engine and
//! dashboard modules. Amounts are `Decimal` end to end; nothing in the
//! wagering path ever touches a float.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RaceId = i64;
pub type CompetitorId = i64;
pub type UserId = i64;
pub type WagerId = i64;

// ---------------------------------------------------------------------------
// Race
// ---------------------------------------------------------------------------

/// Lifecycle of a race. Strictly `Scheduled → Running → Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceStatus {
    Scheduled,
    Running,
    Finished,
}

impl RaceStatus {
    /// The value stored in `races.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RaceStatus::Scheduled => "Scheduled",
            RaceStatus::Running => "Running",
            RaceStatus::Finished => "Finished",
        }
    }

    /// Scheduled and Running races count against the one-active-race rule.
    pub fn is_active(&self) -> bool {
        matches!(self, RaceStatus::Scheduled | RaceStatus::Running)
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RaceStatus {
    type Err = ScrambleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(RaceStatus::Scheduled),
            "Running" => Ok(RaceStatus::Running),
            "Finished" => Ok(RaceStatus::Finished),
            other => Err(ScrambleError::CorruptRow(format!("unknown race status '{other}'"))),
        }
    }
}

/// A single race row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub id: RaceId,
    pub name: String,
    /// Scheduled start time.
    pub start_time: DateTime<Utc>,
    pub status: RaceStatus,
    /// Winning competitor, set only once the race is Finished.
    pub winner_id: Option<CompetitorId>,
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} '{}' ({})", self.id, self.name, self.status)
    }
}

// ---------------------------------------------------------------------------
// Competitors
// ---------------------------------------------------------------------------

/// A racing chicken. The roster is fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: CompetitorId,
    pub name: String,
    /// Payout multiplier applied to a winning stake.
    pub odds: Decimal,
    /// Presentation lane on the track.
    pub lane: i64,
    pub colour: String,
}

impl Competitor {
    /// Amount shown to the bettor when the wager is placed: `stake × odds`.
    pub fn potential_payout(&self, stake: Decimal) -> Result<Decimal> {
        stake.checked_mul(self.odds).ok_or_else(|| payout_overflow(stake))
    }

    /// Amount credited for a winning wager: the stake returned plus the
    /// net profit `stake × (odds − 1)`.
    pub fn winning_payout(&self, stake: Decimal) -> Result<Decimal> {
        winning_payout(stake, self.odds)
    }
}

/// `stake + stake × (odds − 1)`, computed in exact decimal arithmetic.
/// Fails instead of panicking when the result leaves `Decimal` range.
pub fn winning_payout(stake: Decimal, odds: Decimal) -> Result<Decimal> {
    odds.checked_sub(Decimal::ONE)
        .and_then(|net| stake.checked_mul(net))
        .and_then(|profit| stake.checked_add(profit))
        .ok_or_else(|| payout_overflow(stake))
}

fn payout_overflow(stake: Decimal) -> ScrambleError {
    ScrambleError::InvalidStake(format!("payout for stake {stake} is out of range"))
}

/// The fixed set of competitors, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Roster {
    competitors: Vec<Competitor>,
}

impl Roster {
    /// Build a roster. An empty roster is a configuration error: no race
    /// could ever produce a winner.
    pub fn new(competitors: Vec<Competitor>) -> Result<Self, ScrambleError> {
        if competitors.is_empty() {
            return Err(ScrambleError::Config("competitor roster is empty".into()));
        }
        Ok(Self { competitors })
    }

    pub fn get(&self, id: CompetitorId) -> Option<&Competitor> {
        self.competitors.iter().find(|c| c.id == id)
    }

    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    pub fn len(&self) -> usize {
        self.competitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.competitors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Users and wagers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub balance: Decimal,
}

/// Wager outcome. The row ids behind these names live in `wager_statuses`
/// and are looked up by name at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
}

impl WagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Pending => "Pending",
            WagerStatus::Won => "Won",
            WagerStatus::Lost => "Lost",
        }
    }
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WagerStatus {
    type Err = ScrambleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(WagerStatus::Pending),
            "Won" => Ok(WagerStatus::Won),
            "Lost" => Ok(WagerStatus::Lost),
            other => Err(ScrambleError::CorruptRow(format!("unknown wager status '{other}'"))),
        }
    }
}

/// A stake placed by a user on one competitor in one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub user_id: UserId,
    pub race_id: RaceId,
    pub competitor_id: CompetitorId,
    pub stake: Decimal,
    pub status: WagerStatus,
    pub potential_payout: Decimal,
    /// Zero until settled; equals the winning payout when Won.
    pub actual_payout: Decimal,
    pub placed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// What the track display should say right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RacePhase {
    /// Nothing scheduled yet.
    NoRace,
    /// A race is open for betting and counting down.
    Scheduled,
    /// Start time has passed; waiting for the scheduler to start it.
    Starting,
    Running,
    Finished,
}

/// Read-only view of the race state, built from an in-memory copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub phase: RacePhase,
    pub race_id: Option<RaceId>,
    pub race_name: Option<String>,
    /// Whole seconds until the scheduled start, when counting down.
    pub starts_in_secs: Option<i64>,
    pub winner: Option<String>,
    pub betting_open: bool,
}

impl RaceSnapshot {
    /// Countdown formatted as `MM:SS`, or `--:--` when there is none.
    pub fn countdown(&self) -> String {
        match self.starts_in_secs {
            Some(secs) if secs >= 0 => format!("{:02}:{:02}", secs / 60, secs % 60),
            _ => "--:--".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors for the race service.
///
/// Validation errors go back to the bettor with a reason; concurrency
/// losses are expected no-ops; configuration and store errors abort the
/// operation in progress and are logged.
#[derive(Debug, thiserror::Error)]
pub enum ScrambleError {
    #[error("Invalid stake: {0}")]
    InvalidStake(String),

    #[error("Unknown competitor: {0}")]
    UnknownCompetitor(CompetitorId),

    #[error("No race is open for betting")]
    NoOpenRace,

    #[error("Betting is closed for race {0}")]
    BettingClosed(RaceId),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Race not found: {0}")]
    RaceNotFound(RaceId),

    #[error("Race {0} is not schedulable (already started or removed)")]
    RaceNotSchedulable(RaceId),

    #[error("Race {race_id} cannot transition from {status}")]
    InvalidTransition { race_id: RaceId, status: RaceStatus },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Balance for user {0} would overflow")]
    BalanceOverflow(UserId),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl ScrambleError {
    /// Caller mistakes and closed-market rejections. Never logged as
    /// system errors.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ScrambleError::InvalidStake(_)
                | ScrambleError::UnknownCompetitor(_)
                | ScrambleError::NoOpenRace
                | ScrambleError::BettingClosed(_)
                | ScrambleError::InsufficientFunds { .. }
                | ScrambleError::UserNotFound(_)
        )
    }

    /// Another actor got there first. Treated as a no-op.
    pub fn is_concurrency_loss(&self) -> bool {
        matches!(self, ScrambleError::RaceNotSchedulable(_))
    }

    /// Balance known at the point of failure, if the error carries one.
    pub fn balance(&self) -> Option<Decimal> {
        match self {
            ScrambleError::InsufficientFunds { available, .. } => Some(*available),
            _ => None,
        }
    }
}

pub type Result<T, E = ScrambleError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
