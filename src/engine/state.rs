//! In-memory race state.
//!
//! Mirrors what the store says about the next and current race so that
//! status reads never touch the database. All fields sit behind one
//! mutex, and the lock is only ever held for a copy or an assignment,
//! never across an `.await`.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

use crate::types::{CompetitorId, Race, RaceId, RacePhase, RaceSnapshot, RaceStatus, Roster};

/// A point-in-time copy of the race state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateView {
    /// The race open for betting. Its `start_time` is the next start time;
    /// `None` means nothing is scheduled.
    pub next_race: Option<Race>,
    /// The race most recently started or finished.
    pub current_race: Option<Race>,
    /// When the current race is expected to end, while it is Running.
    pub race_ends_at: Option<DateTime<Utc>>,
}

impl StateView {
    pub fn next_race_start(&self) -> Option<DateTime<Utc>> {
        self.next_race.as_ref().map(|r| r.start_time)
    }

    pub fn running_race(&self) -> Option<&Race> {
        self.current_race.as_ref().filter(|r| r.status == RaceStatus::Running)
    }

    /// True once a Running race has outlived its end time by `grace`.
    pub fn is_overdue(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        self.running_race().is_some()
            && self.race_ends_at.is_some_and(|ends_at| now >= ends_at + grace)
    }
}

/// Owner of the race state and its lock.
#[derive(Debug, Default)]
pub struct RaceState {
    inner: Mutex<StateView>,
}

impl RaceState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StateView> {
        // Every write is a plain assignment, so a poisoned guard still
        // holds a consistent value.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn view(&self) -> StateView {
        self.lock().clone()
    }

    /// A race is open for betting; nothing is running.
    pub fn set_scheduled(&self, race: Race) {
        let mut state = self.lock();
        state.next_race = Some(race);
        state.current_race = None;
        state.race_ends_at = None;
    }

    /// A race has started (or was found Running in the store).
    pub fn set_running(&self, race: Race, ends_at: DateTime<Utc>) {
        let mut state = self.lock();
        state.next_race = None;
        state.current_race = Some(Race {
            status: RaceStatus::Running,
            ..race
        });
        state.race_ends_at = Some(ends_at);
    }

    /// Adopt a race read from the store as Scheduled.
    ///
    /// The check and the write happen under one lock: a race this process
    /// has already started or finished, or any Running race, wins over the
    /// stale row and nothing changes. Returns true when the state moved.
    pub fn adopt_scheduled(&self, race: Race) -> bool {
        let mut state = self.lock();
        if state.current_race.as_ref().is_some_and(|c| c.id == race.id) || state.running_race().is_some() {
            return false;
        }
        if state.next_race.as_ref().is_some_and(|n| n.id == race.id) {
            return false;
        }
        state.next_race = Some(race);
        state.current_race = None;
        state.race_ends_at = None;
        true
    }

    /// Adopt a race read from the store as Running, ending at `ends_at`.
    ///
    /// No-op when this process already tracks that race, whether Running
    /// with its own deadline or already Finished. Returns true when the
    /// state moved.
    pub fn adopt_running(&self, race: Race, ends_at: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        if state.current_race.as_ref().is_some_and(|c| c.id == race.id) {
            return false;
        }
        state.next_race = None;
        state.current_race = Some(Race {
            status: RaceStatus::Running,
            ..race
        });
        state.race_ends_at = Some(ends_at);
        true
    }

    /// Forget the remembered start time so the scheduler re-evaluates.
    pub fn clear_next_start(&self) {
        self.lock().next_race = None;
    }

    /// Record a finish. Returns false when the current race is a different
    /// one that is still Running, in which case nothing changes.
    pub fn set_finished(&self, race: Race) -> bool {
        let mut state = self.lock();
        let other_running = state
            .current_race
            .as_ref()
            .is_some_and(|c| c.id != race.id && c.status == RaceStatus::Running);
        if other_running {
            return false;
        }
        if state.next_race.as_ref().is_some_and(|n| n.id == race.id) {
            state.next_race = None;
        }
        state.current_race = Some(race);
        state.race_ends_at = None;
        true
    }

    /// Id of the Running race, if any.
    pub fn running_race_id(&self) -> Option<RaceId> {
        self.lock().running_race().map(|r| r.id)
    }

    /// Build the status view for the track display. Copies the state under
    /// the lock and does everything else after releasing it.
    pub fn snapshot(&self, roster: &Roster, now: DateTime<Utc>) -> RaceSnapshot {
        let view = self.view();
        build_snapshot(&view, roster, now)
    }
}

fn winner_name(roster: &Roster, winner: Option<CompetitorId>) -> Option<String> {
    let id = winner?;
    Some(
        roster
            .get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("Chicken #{id}")),
    )
}

fn build_snapshot(view: &StateView, roster: &Roster, now: DateTime<Utc>) -> RaceSnapshot {
    if let Some(race) = view.running_race() {
        return RaceSnapshot {
            phase: RacePhase::Running,
            race_id: Some(race.id),
            race_name: Some(race.name.clone()),
            starts_in_secs: None,
            winner: None,
            betting_open: false,
        };
    }

    if let Some(next) = &view.next_race {
        let remaining = next.start_time - now;
        let (phase, starts_in_secs, betting_open) = if remaining > chrono::Duration::zero() {
            (RacePhase::Scheduled, Some(remaining.num_seconds()), true)
        } else {
            (RacePhase::Starting, None, false)
        };
        return RaceSnapshot {
            phase,
            race_id: Some(next.id),
            race_name: Some(next.name.clone()),
            starts_in_secs,
            winner: None,
            betting_open,
        };
    }

    if let Some(race) = view.current_race.as_ref().filter(|r| r.status == RaceStatus::Finished) {
        return RaceSnapshot {
            phase: RacePhase::Finished,
            race_id: Some(race.id),
            race_name: Some(race.name.clone()),
            starts_in_secs: None,
            winner: winner_name(roster, race.winner_id),
            betting_open: false,
        };
    }

    RaceSnapshot {
        phase: RacePhase::NoRace,
        race_id: None,
        race_name: None,
        starts_in_secs: None,
        winner: None,
        betting_open: false,
    }
}
