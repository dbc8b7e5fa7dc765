//! Shared harness for integration tests.
//!
//! Builds a store with a three-chicken roster and wires the engine around
//! it. The default store is in memory; [`Harness::on_disk`] opens a real
//! WAL database file with a multi-connection pool so that transactions
//! actually contend for the SQLite write lock. The winner is fixed and can
//! be changed per test.

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use scramble::config::RosterEntry;
use scramble::engine::{
    RaceLifecycle, RaceTiming, ScheduleOutcome, Scheduler, SchedulerEvent, SettlementEngine,
    WagerGateway, WagerRequest, WinnerSelector,
};
use scramble::storage::{competitors, connect, connect_in_memory, schema, users};
use scramble::types::{CompetitorId, RaceId, Roster, UserId};

pub const HENRIETTA: CompetitorId = 1;
pub const CLUCK_NORRIS: CompetitorId = 2;
pub const FOGHORN: CompetitorId = 3;

/// Always picks the configured competitor.
pub struct FixedWinner(AtomicI64);

impl FixedWinner {
    pub fn new(id: CompetitorId) -> Self {
        Self(AtomicI64::new(id))
    }

    pub fn set(&self, id: CompetitorId) {
        self.0.store(id, Ordering::SeqCst);
    }
}

impl WinnerSelector for FixedWinner {
    fn select(&self, _roster: &Roster) -> Option<CompetitorId> {
        Some(self.0.load(Ordering::SeqCst))
    }
}

pub fn slow_timing() -> RaceTiming {
    RaceTiming {
        poll_interval: Duration::from_secs(5),
        race_interval: Duration::from_secs(60),
        race_duration: Duration::from_secs(60),
        max_schedule_ahead: Duration::from_secs(600),
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub roster: Arc<Roster>,
    pub winner: Arc<FixedWinner>,
    pub lifecycle: Arc<RaceLifecycle>,
    pub gateway: WagerGateway,
    events: Option<mpsc::UnboundedReceiver<SchedulerEvent>>,
    _dir: Option<TempDir>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_timing(slow_timing()).await
    }

    pub async fn with_timing(timing: RaceTiming) -> Self {
        let pool = connect_in_memory().await.unwrap();
        Self::build(pool, timing, None).await
    }

    /// File-backed store in a temporary directory, removed on drop.
    pub async fn on_disk(max_connections: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("scramble.db").display());
        let pool = connect(&url, max_connections).await.unwrap();
        Self::build(pool, slow_timing(), Some(dir)).await
    }

    async fn build(pool: SqlitePool, timing: RaceTiming, dir: Option<TempDir>) -> Self {
        schema::ensure_schema(&pool).await.unwrap();
        let entries = vec![
            RosterEntry { name: "Henrietta".into(), odds: dec!(2.5), lane: 10, colour: "red".into() },
            RosterEntry { name: "Cluck Norris".into(), odds: dec!(3.0), lane: 50, colour: "blue".into() },
            RosterEntry { name: "Foghorn".into(), odds: dec!(4.0), lane: 90, colour: "green".into() },
        ];
        schema::seed_roster(&pool, &entries).await.unwrap();
        let roster = Arc::new(competitors::load_roster(&pool).await.unwrap());

        let winner = Arc::new(FixedWinner::new(HENRIETTA));
        let (tx, rx) = mpsc::unbounded_channel();
        let lifecycle = Arc::new(RaceLifecycle::new(
            pool.clone(),
            Arc::clone(&roster),
            SettlementEngine::new(winner.clone()),
            timing,
            tx,
        ));
        let gateway = WagerGateway::new(pool.clone(), Arc::clone(&roster));

        Self {
            pool,
            roster,
            winner,
            lifecycle,
            gateway,
            events: Some(rx),
            _dir: dir,
        }
    }

    /// Hand the event receiver to a scheduler loop. Only once per harness.
    pub fn scheduler(&mut self) -> Scheduler {
        let events = self.events.take().expect("scheduler already taken");
        Scheduler::new(Arc::clone(&self.lifecycle), events)
    }

    pub async fn user(&self, name: &str, balance: Decimal) -> UserId {
        users::insert_user(&self.pool, name, balance).await.unwrap()
    }

    pub async fn balance(&self, user: UserId) -> Decimal {
        users::balance(&self.pool, user).await.unwrap().unwrap()
    }

    /// Schedule a fresh race and return its id.
    pub async fn open_race(&self) -> RaceId {
        match self.lifecycle.schedule().await.unwrap() {
            ScheduleOutcome::Created(race) => race.id,
            other => panic!("expected a new race, got {other:?}"),
        }
    }
}

pub fn bet(user_id: UserId, stake: Decimal, competitor_id: CompetitorId) -> WagerRequest {
    WagerRequest {
        user_id,
        stake,
        competitor_id,
    }
}
