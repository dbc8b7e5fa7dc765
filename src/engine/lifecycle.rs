//! Race lifecycle transitions — Schedule, Start and Finish.
//!
//! These are the only code paths that move a race through
//! `Scheduled → Running → Finished`. The scheduler loop and the admin
//! override both call them, so the invariants hold identically whichever
//! actor triggers a transition.
//!
//! Concurrency guards:
//! - Start relies on a conditional `UPDATE … WHERE status = 'Scheduled'`.
//! - Finish relies on a conditional `UPDATE … WHERE status = 'Running'`
//!   inside the settlement transaction.
//! - Schedule is serialized by `schedule_guard` and runs its check and
//!   insert in one transaction.
//!
//! The race state lock is never held across store I/O.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RaceConfig;
use crate::engine::settlement::{SettlementEngine, SettlementReport};
use crate::engine::state::RaceState;
use crate::storage::{begin_immediate, races};
use crate::types::{Competitor, Race, RaceId, RaceSnapshot, RaceStatus, Result, Roster, ScrambleError};

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Durations that drive the lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct RaceTiming {
    pub poll_interval: Duration,
    pub race_interval: Duration,
    pub race_duration: Duration,
    pub max_schedule_ahead: Duration,
}

impl From<&RaceConfig> for RaceTiming {
    fn from(cfg: &RaceConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            race_interval: cfg.race_interval(),
            race_duration: cfg.race_duration(),
            max_schedule_ahead: cfg.max_schedule_ahead(),
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}

// ---------------------------------------------------------------------------
// Events and outcomes
// ---------------------------------------------------------------------------

/// Messages delivered to the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The end timer for this race has fired.
    RaceEnded(RaceId),
    /// Re-evaluate now instead of waiting for the next poll.
    Nudge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    /// A new race row was inserted.
    Created(Race),
    /// A Scheduled race already existed and was adopted.
    AlreadyScheduled(Race),
    /// A Running race already existed and was adopted.
    AlreadyRunning(Race),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    Finished {
        race: Race,
        winner: Competitor,
        report: SettlementReport,
    },
    /// Somebody else already finished it. Nothing was settled.
    AlreadyFinished(RaceId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Finished(FinishOutcome),
    Started(Race),
    Scheduled(ScheduleOutcome),
}

// ---------------------------------------------------------------------------
// Race names
// ---------------------------------------------------------------------------

const ADJECTIVES: &[&str] = &[
    "Speedy", "Thunder", "Golden", "Lightning", "Cosmic", "Barnyard", "Feathered", "Clucky",
];
const NOUNS: &[&str] = &["Derby", "Sprint", "Classic", "Gallop", "Frenzy", "Run", "Cup", "Challenge"];

/// "<Adjective> <Noun> #<n>", e.g. "Cosmic Cup #417".
pub fn generate_race_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Speedy");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Derby");
    format!("{adjective} {noun} #{}", rng.gen_range(0..1000))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

struct EndTimer {
    race_id: RaceId,
    handle: JoinHandle<()>,
}

pub struct RaceLifecycle {
    pool: SqlitePool,
    roster: Arc<Roster>,
    state: RaceState,
    settlement: SettlementEngine,
    timing: RaceTiming,
    schedule_guard: tokio::sync::Mutex<()>,
    end_timer: Mutex<Option<EndTimer>>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
}

impl RaceLifecycle {
    pub fn new(
        pool: SqlitePool,
        roster: Arc<Roster>,
        settlement: SettlementEngine,
        timing: RaceTiming,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> Self {
        Self {
            pool,
            roster,
            state: RaceState::new(),
            settlement,
            timing,
            schedule_guard: tokio::sync::Mutex::new(()),
            end_timer: Mutex::new(None),
            events,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn state(&self) -> &RaceState {
        &self.state
    }

    pub fn timing(&self) -> RaceTiming {
        self.timing
    }

    /// Current status for the track display. Never touches the store.
    pub fn snapshot(&self) -> RaceSnapshot {
        self.state.snapshot(&self.roster, Utc::now())
    }

    // -- Schedule ------------------------------------------------------------

    /// Make sure exactly one race is Scheduled or Running.
    ///
    /// If one already exists it is adopted into the race state; otherwise a
    /// new race is inserted starting `race_interval` from now. Concurrent
    /// calls are serialized and never both insert.
    pub async fn schedule(&self) -> Result<ScheduleOutcome> {
        let _guard = self.schedule_guard.lock().await;
        let now = Utc::now();

        if let Err(e) = self.cleanup_far_future(now).await {
            warn!(error = %e, "Far-future race cleanup failed, continuing");
        }

        let mut tx = begin_immediate(&self.pool).await?;
        let active = races::active_races(&mut *tx).await?;

        let running = active.iter().find(|r| r.status == RaceStatus::Running);
        if let Some(existing) = running.or(active.first()).cloned() {
            drop(tx);
            if active.len() > 1 {
                warn!(
                    count = active.len(),
                    adopted = existing.id,
                    "More than one active race in the store"
                );
            }
            return Ok(self.adopt(existing, now));
        }

        let name = generate_race_name();
        let start_time = now + chrono_duration(self.timing.race_interval);
        let id = races::insert_scheduled(&mut *tx, &name, start_time).await?;
        tx.commit().await?;

        let race = Race {
            id,
            name,
            start_time,
            status: RaceStatus::Scheduled,
            winner_id: None,
        };
        self.state.set_scheduled(race.clone());
        info!(
            race_id = id,
            name = %race.name,
            start_time = %start_time,
            "Scheduled new race"
        );
        Ok(ScheduleOutcome::Created(race))
    }

    fn adopt(&self, race: Race, now: DateTime<Utc>) -> ScheduleOutcome {
        match race.status {
            RaceStatus::Running => {
                // No end timer is armed for it in this process: give it an
                // immediate deadline so the loop finishes it.
                if self.state.adopt_running(race.clone(), now) {
                    warn!(race_id = race.id, "Adopted Running race with no end timer");
                }
                ScheduleOutcome::AlreadyRunning(race)
            }
            _ => {
                if self.state.adopt_scheduled(race.clone()) {
                    debug!(race_id = race.id, start_time = %race.start_time, "Adopted scheduled race");
                }
                ScheduleOutcome::AlreadyScheduled(race)
            }
        }
    }

    /// Remove Scheduled races dated implausibly far in the future.
    async fn cleanup_far_future(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now + chrono_duration(self.timing.max_schedule_ahead);
        let removed = races::delete_far_future_scheduled(&self.pool, cutoff).await?;
        if removed > 0 {
            warn!(removed, cutoff = %cutoff, "Removed scheduled races dated too far ahead");
            let view = self.state.view();
            if view.next_race_start().is_some_and(|start| start > cutoff) {
                self.state.clear_next_start();
            }
        }
        Ok(removed)
    }

    // -- Start ---------------------------------------------------------------

    /// `Scheduled → Running` for `race_id`, then arm the end timer.
    ///
    /// Fails with [`ScrambleError::RaceNotSchedulable`] when the race is no
    /// longer Scheduled: another actor won the race to start it.
    pub async fn start(&self, race_id: RaceId) -> Result<Race> {
        let changed = races::mark_running(&self.pool, race_id).await?;
        if changed == 0 {
            let status = races::race_status(&self.pool, race_id).await.ok().flatten();
            info!(race_id, status = ?status, "Race not in Scheduled state, start skipped");
            return Err(ScrambleError::RaceNotSchedulable(race_id));
        }

        let race = match races::get_race(&self.pool, race_id).await {
            Ok(Some(race)) => race,
            Ok(None) => return Err(ScrambleError::RaceNotFound(race_id)),
            Err(e) => {
                warn!(race_id, error = %e, "Could not load started race, using minimal details");
                Race {
                    id: race_id,
                    name: format!("Race {race_id}"),
                    start_time: Utc::now(),
                    status: RaceStatus::Running,
                    winner_id: None,
                }
            }
        };

        let ends_at = Utc::now() + chrono_duration(self.timing.race_duration);
        self.state.set_running(race.clone(), ends_at);
        self.arm_end_timer(race_id);

        info!(
            race_id,
            name = %race.name,
            duration_secs = self.timing.race_duration.as_secs_f64(),
            "Race started"
        );
        Ok(Race {
            status: RaceStatus::Running,
            ..race
        })
    }

    fn arm_end_timer(&self, race_id: RaceId) {
        self.arm_end_timer_after(race_id, self.timing.race_duration);
    }

    fn arm_end_timer_after(&self, race_id: RaceId, duration: Duration) {
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            debug!(race_id, "Race end timer fired");
            if events.send(SchedulerEvent::RaceEnded(race_id)).is_err() {
                warn!(race_id, "Scheduler loop is gone, race end not delivered");
            }
        });

        let mut slot = self.end_timer.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.replace(EndTimer { race_id, handle }) {
            previous.handle.abort();
        }
    }

    /// Abort the pending race-end timer, if any.
    pub fn cancel_end_timer(&self) {
        let mut slot = self.end_timer.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(timer) = slot.take() {
            debug!(race_id = timer.race_id, "Race end timer cancelled");
            timer.handle.abort();
        }
    }

    fn cancel_end_timer_for(&self, race_id: RaceId) {
        let mut slot = self.end_timer.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|t| t.race_id == race_id) {
            if let Some(timer) = slot.take() {
                timer.handle.abort();
            }
        }
    }

    // -- Finish --------------------------------------------------------------

    /// `Running → Finished`: pick a winner, record it and settle every
    /// pending wager in one transaction.
    ///
    /// Calling this on an already Finished race is a harmless no-op. On any
    /// failure the transaction rolls back and the race stays Running.
    pub async fn finish(&self, race_id: RaceId) -> Result<FinishOutcome> {
        match races::race_status(&self.pool, race_id).await? {
            None => return Err(ScrambleError::RaceNotFound(race_id)),
            Some(RaceStatus::Finished) => {
                info!(race_id, "Race already finished, nothing to do");
                self.cancel_end_timer_for(race_id);
                return Ok(FinishOutcome::AlreadyFinished(race_id));
            }
            Some(RaceStatus::Scheduled) => {
                return Err(ScrambleError::InvalidTransition {
                    race_id,
                    status: RaceStatus::Scheduled,
                });
            }
            Some(RaceStatus::Running) => {}
        }

        let winner = self.settlement.pick_winner(&self.roster)?.clone();

        let mut tx = begin_immediate(&self.pool).await?;
        let changed = races::mark_finished(&mut *tx, race_id, winner.id).await?;
        if changed == 0 {
            // Finished by a concurrent caller between the check and here.
            drop(tx);
            info!(race_id, "Race finished concurrently, skipping settlement");
            return Ok(FinishOutcome::AlreadyFinished(race_id));
        }
        let report = self.settlement.settle(&mut tx, race_id, winner.id).await?;
        tx.commit().await?;

        self.cancel_end_timer_for(race_id);

        let race = match races::get_race(&self.pool, race_id).await {
            Ok(Some(race)) => race,
            Ok(None) => return Err(ScrambleError::RaceNotFound(race_id)),
            Err(e) => {
                warn!(race_id, error = %e, "Could not reload finished race");
                Race {
                    id: race_id,
                    name: format!("Race {race_id}"),
                    start_time: Utc::now(),
                    status: RaceStatus::Finished,
                    winner_id: Some(winner.id),
                }
            }
        };
        if !self.state.set_finished(race.clone()) {
            debug!(race_id, "Finished a stale race while another is running");
        }

        info!(
            race_id,
            name = %race.name,
            winner = %winner.name,
            settled = report.wagers_settled(),
            "Race finished"
        );
        Ok(FinishOutcome::Finished { race, winner, report })
    }

    /// Finish the Running race if its end time has long passed.
    ///
    /// Covers a lost end timer (process restart) and a Finish that rolled
    /// back. Returns `Ok(None)` when nothing is overdue.
    pub async fn finish_overdue(&self, now: DateTime<Utc>) -> Result<Option<FinishOutcome>> {
        let view = self.state.view();
        let grace = chrono_duration(self.timing.poll_interval);
        if !view.is_overdue(now, grace) {
            return Ok(None);
        }
        let Some(race) = view.running_race() else {
            return Ok(None);
        };
        warn!(race_id = race.id, "Race is overdue, finishing it");
        self.finish(race.id).await.map(Some)
    }

    // -- Admin ---------------------------------------------------------------

    /// Push the lifecycle one step forward on operator request.
    ///
    /// Finishes the Running race if there is one, otherwise starts the
    /// earliest Scheduled race, otherwise schedules a new one. Uses the
    /// same transitions as the scheduler loop.
    pub async fn force_advance(&self) -> Result<AdvanceOutcome> {
        let outcome = if let Some(race_id) = self.state.running_race_id() {
            info!(race_id, "ADMIN: forcing finish of running race");
            self.cancel_end_timer_for(race_id);
            AdvanceOutcome::Finished(self.finish(race_id).await?)
        } else if let Some(race) = races::earliest_scheduled(&self.pool).await? {
            info!(race_id = race.id, name = %race.name, "ADMIN: forcing start of scheduled race");
            AdvanceOutcome::Started(self.start(race.id).await?)
        } else {
            info!("ADMIN: nothing running or scheduled, scheduling a race");
            AdvanceOutcome::Scheduled(self.schedule().await?)
        };

        if self.events.send(SchedulerEvent::Nudge).is_err() {
            debug!("Scheduler loop not running, nudge dropped");
        }
        Ok(outcome)
    }

    /// Log a transition failure at the level its category deserves.
    pub fn log_failure(&self, action: &str, err: &ScrambleError) {
        if err.is_concurrency_loss() {
            info!(action, error = %err, "Transition lost to a concurrent actor");
        } else {
            error!(action, error = %err, "Transition failed, will retry");
        }
    }
}

impl Drop for RaceLifecycle {
    fn drop(&mut self) {
        self.cancel_end_timer();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::settlement::MockWinnerSelector;
    use crate::config::RosterEntry;
    use crate::storage::{competitors, connect_in_memory, schema};
    use rust_decimal_macros::dec;

    fn timing() -> RaceTiming {
        RaceTiming {
            poll_interval: Duration::from_secs(5),
            race_interval: Duration::from_secs(60),
            race_duration: Duration::from_secs(60),
            max_schedule_ahead: Duration::from_secs(600),
        }
    }

    async fn lifecycle(
        winner: i64,
    ) -> (Arc<RaceLifecycle>, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let pool = connect_in_memory().await.unwrap();
        schema::ensure_schema(&pool).await.unwrap();
        let entries = vec![
            RosterEntry { name: "Henrietta".into(), odds: dec!(2.5), lane: 10, colour: "red".into() },
            RosterEntry { name: "Cluck Norris".into(), odds: dec!(3.0), lane: 50, colour: "blue".into() },
        ];
        schema::seed_roster(&pool, &entries).await.unwrap();
        let roster = Arc::new(competitors::load_roster(&pool).await.unwrap());

        let mut selector = MockWinnerSelector::new();
        selector.expect_select().returning(move |_| Some(winner));
        let (tx, rx) = mpsc::unbounded_channel();
        let lifecycle = RaceLifecycle::new(
            pool,
            roster,
            SettlementEngine::new(Arc::new(selector)),
            timing(),
            tx,
        );
        (Arc::new(lifecycle), rx)
    }

    #[test]
    fn test_generated_names_use_word_lists() {
        for _ in 0..20 {
            let name = generate_race_name();
            let parts: Vec<&str> = name.split(' ').collect();
            assert_eq!(parts.len(), 3);
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(NOUNS.contains(&parts[1]));
            assert!(parts[2].starts_with('#'));
        }
    }

    #[tokio::test]
    async fn test_schedule_creates_then_adopts() {
        let (lc, _rx) = lifecycle(1).await;

        let first = lc.schedule().await.unwrap();
        let ScheduleOutcome::Created(race) = first else {
            panic!("expected a new race, got {first:?}");
        };
        assert_eq!(lc.state().view().next_race.as_ref().map(|r| r.id), Some(race.id));

        let second = lc.schedule().await.unwrap();
        assert!(matches!(second, ScheduleOutcome::AlreadyScheduled(ref r) if r.id == race.id));
        assert_eq!(races::active_races(lc.pool()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_arms_timer_and_updates_state() {
        let (lc, _rx) = lifecycle(1).await;
        let ScheduleOutcome::Created(race) = lc.schedule().await.unwrap() else {
            panic!("expected a new race");
        };

        let started = lc.start(race.id).await.unwrap();
        assert_eq!(started.status, RaceStatus::Running);
        assert_eq!(lc.state().running_race_id(), Some(race.id));
        assert!(lc.state().view().next_race.is_none());
        assert!(lc.end_timer.lock().unwrap().is_some());

        let again = lc.start(race.id).await.unwrap_err();
        assert!(matches!(again, ScrambleError::RaceNotSchedulable(id) if id == race.id));
    }

    #[tokio::test]
    async fn test_finish_scheduled_race_is_invalid() {
        let (lc, _rx) = lifecycle(1).await;
        let ScheduleOutcome::Created(race) = lc.schedule().await.unwrap() else {
            panic!("expected a new race");
        };
        let err = lc.finish(race.id).await.unwrap_err();
        assert!(matches!(err, ScrambleError::InvalidTransition { status: RaceStatus::Scheduled, .. }));
    }

    #[tokio::test]
    async fn test_finish_unknown_race() {
        let (lc, _rx) = lifecycle(1).await;
        assert!(matches!(lc.finish(404).await, Err(ScrambleError::RaceNotFound(404))));
    }

    #[tokio::test]
    async fn test_finish_twice_is_noop() {
        let (lc, _rx) = lifecycle(2).await;
        let ScheduleOutcome::Created(race) = lc.schedule().await.unwrap() else {
            panic!("expected a new race");
        };
        lc.start(race.id).await.unwrap();

        let first = lc.finish(race.id).await.unwrap();
        let FinishOutcome::Finished { race: finished, winner, .. } = first else {
            panic!("expected a finish");
        };
        assert_eq!(finished.status, RaceStatus::Finished);
        assert_eq!(finished.winner_id, Some(2));
        assert_eq!(winner.name, "Cluck Norris");
        assert!(lc.end_timer.lock().unwrap().is_none());

        let second = lc.finish(race.id).await.unwrap();
        assert_eq!(second, FinishOutcome::AlreadyFinished(race.id));
    }

    #[tokio::test]
    async fn test_schedule_adopts_orphaned_running_race() {
        let (lc, _rx) = lifecycle(1).await;
        let id = races::insert_scheduled(lc.pool(), "Orphan Derby #1", Utc::now()).await.unwrap();
        races::mark_running(lc.pool(), id).await.unwrap();

        let outcome = lc.schedule().await.unwrap();
        assert!(matches!(outcome, ScheduleOutcome::AlreadyRunning(ref r) if r.id == id));
        assert_eq!(lc.state().running_race_id(), Some(id));

        // Deadline was set to "now", so it is overdue after the grace period.
        let later = Utc::now() + chrono::Duration::seconds(6);
        let finished = lc.finish_overdue(later).await.unwrap();
        assert!(matches!(finished, Some(FinishOutcome::Finished { .. })));
        assert_eq!(races::race_status(lc.pool(), id).await.unwrap(), Some(RaceStatus::Finished));
    }

    #[tokio::test]
    async fn test_stale_scheduled_read_does_not_revert_started_race() {
        let (lc, _rx) = lifecycle(1).await;
        let ScheduleOutcome::Created(race) = lc.schedule().await.unwrap() else {
            panic!("expected a new race");
        };
        // A Schedule call read the row while it was still Scheduled, then
        // the loop started the race before the adoption landed.
        let stale = race.clone();
        lc.start(race.id).await.unwrap();
        let ends_at = lc.state().view().race_ends_at;

        let outcome = lc.adopt(stale, Utc::now());
        assert!(matches!(outcome, ScheduleOutcome::AlreadyScheduled(_)));
        assert_eq!(lc.state().running_race_id(), Some(race.id));
        assert_eq!(lc.state().view().race_ends_at, ends_at);
        assert!(lc.state().view().next_race.is_none());
        assert_eq!(lc.snapshot().phase, crate::types::RacePhase::Running);
    }

    #[tokio::test]
    async fn test_stale_running_read_does_not_revive_finished_race() {
        let (lc, _rx) = lifecycle(1).await;
        let ScheduleOutcome::Created(race) = lc.schedule().await.unwrap() else {
            panic!("expected a new race");
        };
        let running = lc.start(race.id).await.unwrap();
        lc.finish(race.id).await.unwrap();

        lc.adopt(running, Utc::now());
        assert_eq!(lc.state().running_race_id(), None);
        assert_eq!(lc.snapshot().phase, crate::types::RacePhase::Finished);
    }

    #[tokio::test]
    async fn test_finish_overdue_ignores_fresh_race() {
        let (lc, _rx) = lifecycle(1).await;
        let ScheduleOutcome::Created(race) = lc.schedule().await.unwrap() else {
            panic!("expected a new race");
        };
        lc.start(race.id).await.unwrap();
        assert!(lc.finish_overdue(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schedule_removes_far_future_race() {
        let (lc, _rx) = lifecycle(1).await;
        let far = races::insert_scheduled(lc.pool(), "Far Cup #9", Utc::now() + chrono::Duration::days(30))
            .await
            .unwrap();

        let outcome = lc.schedule().await.unwrap();
        let ScheduleOutcome::Created(race) = outcome else {
            panic!("expected a fresh race, got {outcome:?}");
        };
        assert_ne!(race.id, far);
        assert!(races::get_race(lc.pool(), far).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_force_advance_walks_the_lifecycle() {
        let (lc, mut rx) = lifecycle(1).await;

        let scheduled = lc.force_advance().await.unwrap();
        assert!(matches!(scheduled, AdvanceOutcome::Scheduled(ScheduleOutcome::Created(_))));
        assert_eq!(rx.recv().await, Some(SchedulerEvent::Nudge));

        let started = lc.force_advance().await.unwrap();
        let AdvanceOutcome::Started(race) = started else {
            panic!("expected a start, got {started:?}");
        };
        assert_eq!(rx.recv().await, Some(SchedulerEvent::Nudge));

        let finished = lc.force_advance().await.unwrap();
        assert!(matches!(
            finished,
            AdvanceOutcome::Finished(FinishOutcome::Finished { race: ref r, .. }) if r.id == race.id
        ));
    }

    #[tokio::test]
    async fn test_end_timer_delivers_event() {
        let (lc, mut rx) = lifecycle(1).await;
        let ScheduleOutcome::Created(race) = lc.schedule().await.unwrap() else {
            panic!("expected a new race");
        };
        lc.arm_end_timer_after(race.id, Duration::from_millis(10));
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(event, Some(SchedulerEvent::RaceEnded(race.id)));
    }
}
