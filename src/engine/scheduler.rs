//! Scheduler loop — drives races forward without external input.
//!
//! One background task owns the loop. It wakes on the poll interval, on
//! race-end events from the end timer, and on nudges from the admin path,
//! and decides which transition (schedule / start / finish) to perform.
//! A failed transition is logged and retried on the next wake; the loop
//! itself only exits on shutdown.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::lifecycle::{FinishOutcome, RaceLifecycle, ScheduleOutcome, SchedulerEvent};
use crate::storage::races;
use crate::types::{Race, RaceId, Result};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A race is running and not yet overdue. Its end timer will finish it.
    Running(RaceId),
    /// An overdue Running race was finished.
    Recovered(FinishOutcome),
    Started(Race),
    /// The due race was taken by another actor first.
    StartSkipped(RaceId),
    /// A start time was remembered but no due race exists any more.
    Cleared,
    Scheduled(ScheduleOutcome),
}

pub struct Scheduler {
    lifecycle: Arc<RaceLifecycle>,
    events: mpsc::UnboundedReceiver<SchedulerEvent>,
}

impl Scheduler {
    pub fn new(lifecycle: Arc<RaceLifecycle>, events: mpsc::UnboundedReceiver<SchedulerEvent>) -> Self {
        Self { lifecycle, events }
    }

    pub fn lifecycle(&self) -> &Arc<RaceLifecycle> {
        &self.lifecycle
    }

    /// Main loop. Runs until `shutdown` carries `true` or its sender drops.
    ///
    /// The current iteration always completes before the loop returns; the
    /// pending race-end timer is aborted on the way out.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let poll = self.lifecycle.timing().poll_interval;
        info!(poll_secs = poll.as_secs_f64(), "Scheduler loop started");

        // Reconcile with the store before the first poll.
        if let Err(e) = self.lifecycle.schedule().await {
            self.lifecycle.log_failure("initial schedule", &e);
        }

        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler loop received shutdown");
                        break;
                    }
                }
                Some(event) = self.events.recv() => {
                    self.handle_event(event).await;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        self.lifecycle.log_failure("tick", &e);
                    }
                }
            }
        }

        self.lifecycle.cancel_end_timer();
        info!("Scheduler loop stopped");
    }

    async fn handle_event(&self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::RaceEnded(race_id) => {
                debug!(race_id, "Race end event received");
                if let Err(e) = self.lifecycle.finish(race_id).await {
                    // The race stays Running and is retried once overdue.
                    self.lifecycle.log_failure("finish", &e);
                }
            }
            SchedulerEvent::Nudge => {
                if let Err(e) = self.tick().await {
                    self.lifecycle.log_failure("tick", &e);
                }
            }
        }
    }

    /// Evaluate the race state once and perform at most one transition.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let now = Utc::now();
        let view = self.lifecycle.state().view();

        if let Some(race) = view.running_race() {
            let race_id = race.id;
            return match self.lifecycle.finish_overdue(now).await? {
                Some(outcome) => Ok(TickOutcome::Recovered(outcome)),
                None => Ok(TickOutcome::Running(race_id)),
            };
        }

        if view.next_race_start().is_some_and(|start| start <= now) {
            let due = match races::earliest_due_scheduled(self.lifecycle.pool(), now).await {
                Ok(due) => due,
                Err(e) => {
                    self.lifecycle.state().clear_next_start();
                    return Err(e);
                }
            };
            let Some(race) = due else {
                debug!("Remembered start time has no due race, re-evaluating");
                self.lifecycle.state().clear_next_start();
                return Ok(TickOutcome::Cleared);
            };

            return match self.lifecycle.start(race.id).await {
                Ok(started) => Ok(TickOutcome::Started(started)),
                Err(e) if e.is_concurrency_loss() => {
                    info!(race_id = race.id, "Race was started elsewhere");
                    self.lifecycle.state().clear_next_start();
                    Ok(TickOutcome::StartSkipped(race.id))
                }
                Err(e) => {
                    warn!(race_id = race.id, error = %e, "Start failed, state will be re-derived");
                    self.lifecycle.state().clear_next_start();
                    Err(e)
                }
            };
        }

        self.lifecycle.schedule().await.map(TickOutcome::Scheduled)
    }
}
