//! Transitions and wagers racing each other on a file-backed WAL store
//! with a multi-connection pool, where transactions really contend for
//! the SQLite write lock.

mod common;

use common::{bet, Harness, HENRIETTA};
use futures::future::join_all;
use rust_decimal_macros::dec;

use scramble::engine::{FinishOutcome, ScheduleOutcome};
use scramble::storage::{races, wagers};
use scramble::types::{RaceStatus, ScrambleError};

const POOL_SIZE: u32 = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_wagers_from_many_users_all_commit() {
    let h = Harness::on_disk(POOL_SIZE).await;
    let race = h.open_race().await;

    let mut bettors = Vec::new();
    for i in 0..24 {
        bettors.push(h.user(&format!("bettor{i}"), dec!(50)).await);
    }
    let requests: Vec<_> = bettors.iter().map(|&u| bet(u, dec!(10), HENRIETTA)).collect();

    let results = join_all(requests.iter().map(|r| h.gateway.place_wager(r))).await;
    for result in &results {
        assert!(result.is_ok(), "wager failed under contention: {result:?}");
    }

    assert_eq!(wagers::wagers_for_race(&h.pool, race).await.unwrap().len(), bettors.len());
    for user in bettors {
        assert_eq!(h.balance(user).await, dec!(40));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_wagers_from_one_user_never_overdraw() {
    let h = Harness::on_disk(POOL_SIZE).await;
    let race = h.open_race().await;
    let alice = h.user("alice", dec!(50)).await;
    let requests: Vec<_> = (0..10).map(|_| bet(alice, dec!(10), HENRIETTA)).collect();

    let results = join_all(requests.iter().map(|r| h.gateway.place_wager(r))).await;
    let placed = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(ScrambleError::InsufficientFunds { .. })))
        .count();

    assert_eq!(placed, 5);
    assert_eq!(refused, 5);
    assert_eq!(h.balance(alice).await, dec!(0));
    assert_eq!(wagers::wagers_for_race(&h.pool, race).await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_starts_on_disk_run_race_once() {
    let h = Harness::on_disk(POOL_SIZE).await;
    let race = h.open_race().await;

    let results = join_all((0..6).map(|_| h.lifecycle.start(race))).await;
    let started = results.iter().filter(|r| r.is_ok()).count();
    let lost = results
        .iter()
        .filter(|r| matches!(r, Err(ScrambleError::RaceNotSchedulable(id)) if *id == race))
        .count();

    assert_eq!(started, 1);
    assert_eq!(lost, 5);
    assert_eq!(races::race_status(&h.pool, race).await.unwrap(), Some(RaceStatus::Running));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_schedules_on_disk_insert_one_race() {
    let h = Harness::on_disk(POOL_SIZE).await;

    let results = join_all((0..6).map(|_| h.lifecycle.schedule())).await;
    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(ScheduleOutcome::Created(_))))
        .count();

    assert!(results.iter().all(|r| r.is_ok()), "schedule failed: {results:?}");
    assert_eq!(created, 1);
    assert_eq!(races::active_races(&h.pool).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wagers_racing_a_start_are_placed_or_closed() {
    let h = Harness::on_disk(POOL_SIZE).await;
    let race = h.open_race().await;

    let mut bettors = Vec::new();
    for i in 0..16 {
        bettors.push(h.user(&format!("bettor{i}"), dec!(50)).await);
    }
    let requests: Vec<_> = bettors.iter().map(|&u| bet(u, dec!(10), HENRIETTA)).collect();

    let bets = join_all(requests.iter().map(|r| h.gateway.place_wager(r)));
    let (results, started) = tokio::join!(bets, h.lifecycle.start(race));
    assert!(started.is_ok());

    let mut placed = 0;
    for (user, result) in bettors.iter().zip(&results) {
        match result {
            Ok(receipt) => {
                assert_eq!(receipt.race_id, race);
                assert_eq!(h.balance(*user).await, dec!(40));
                placed += 1;
            }
            Err(ScrambleError::BettingClosed(id)) => {
                assert_eq!(*id, race);
                assert_eq!(h.balance(*user).await, dec!(50));
            }
            Err(e) => panic!("unexpected error under contention: {e}"),
        }
    }
    assert_eq!(wagers::wagers_for_race(&h.pool, race).await.unwrap().len(), placed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_finishes_on_disk_pay_once() {
    let h = Harness::on_disk(POOL_SIZE).await;
    let alice = h.user("alice", dec!(100)).await;
    let race = h.open_race().await;
    h.gateway.place_wager(&bet(alice, dec!(20), HENRIETTA)).await.unwrap();
    h.lifecycle.start(race).await.unwrap();

    let results = join_all((0..4).map(|_| h.lifecycle.finish(race))).await;
    let finished = results
        .iter()
        .filter(|r| matches!(r, Ok(FinishOutcome::Finished { .. })))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r, Ok(FinishOutcome::AlreadyFinished(id)) if *id == race))
        .count();

    assert_eq!(finished, 1);
    assert_eq!(skipped, 3);
    assert_eq!(h.balance(alice).await, dec!(130));
}
