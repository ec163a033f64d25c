//! Scheduler integration tests.
//!
//! Time is driven by the harness clock, so "thirty-one minutes later" is a
//! single `advance` call rather than a sleep.

mod common;

use arenapay_settlement::{SchedulerHooks, SchedulerRunner};
use arenapay_types::*;
use chrono::Duration;
use tokio::sync::watch;

use common::{Harness, coins};

const SECRET: &str = "cron-shared-secret";

fn hooks(h: &Harness) -> SchedulerHooks {
    SchedulerHooks::new(h.engine.clone(), &scheduler_config())
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        interval_secs: 1,
        shared_secret: Some(SECRET.to_string()),
    }
}

// =============================================================================
// Test: Due tournaments start once and participants are told
// =============================================================================
#[test]
fn scheduler_auto_starts_due_tournaments() {
    let h = Harness::new();
    let alice = h.player(100);
    let tid = h.tournament(10, 50);
    h.join(&alice, tid);
    let hooks = hooks(&h);

    let early = hooks.tick(SECRET).expect("tick");
    assert!(early.started.is_empty(), "start time not reached");

    h.clock.advance(Duration::minutes(61));
    let report = hooks.tick(SECRET).expect("tick");
    assert_eq!(report.started, vec![tid]);
    assert_eq!(
        h.engine.tournament(tid).unwrap().status,
        TournamentStatus::Live
    );
    assert!(
        h.sink
            .notifications_for(alice.id)
            .iter()
            .any(|n| n.title == "Tournament is live")
    );

    let rerun = hooks.tick(SECRET).expect("tick");
    assert!(rerun.started.is_empty());

    let bob = h.player(100);
    let err = h
        .engine
        .join_tournament(&bob, tid, "uid-bob", "Bob")
        .unwrap_err();
    assert!(matches!(err, ArenaError::TournamentNotOpen(TournamentStatus::Live)));
}

// =============================================================================
// Test: Cancelled tournaments are never started
// =============================================================================
#[test]
fn scheduler_skips_cancelled_tournaments() {
    let h = Harness::new();
    let tid = h.tournament(10, 50);
    h.engine.cancel_tournament(&h.admin, tid).expect("cancel");

    h.clock.advance(Duration::hours(2));
    let report = hooks(&h).tick(SECRET).expect("tick");
    assert!(report.started.is_empty());
    assert_eq!(
        h.engine.tournament(tid).unwrap().status,
        TournamentStatus::Cancelled
    );
}

// =============================================================================
// Test: A stuck withdrawal is failed and its funds returned, once
// =============================================================================
#[test]
fn scheduler_fails_stuck_withdrawal_and_refunds() {
    let h = Harness::new();
    let alice = h.player(1000);
    let withdrawal = h
        .engine
        .request_withdrawal(&alice, coins(200))
        .expect("request");
    assert_eq!(h.balance(alice.id), coins(800));
    let hooks = hooks(&h);

    h.clock.advance(Duration::minutes(29));
    assert!(hooks.tick(SECRET).expect("tick").expired.is_empty());

    h.clock.advance(Duration::minutes(2));
    let report = hooks.tick(SECRET).expect("tick");
    assert_eq!(report.expired, vec![withdrawal.id]);

    let entry = h.engine.entry(withdrawal.id).unwrap();
    assert_eq!(entry.status, EntryStatus::Failed);
    assert_eq!(
        entry.status_reason.as_deref(),
        Some(constants::STUCK_ENTRY_REASON)
    );
    assert_eq!(h.balance(alice.id), coins(1000));

    let rerun = hooks.tick(SECRET).expect("tick");
    assert!(rerun.expired.is_empty());
    assert_eq!(h.balance(alice.id), coins(1000));

    // The admin can no longer act on it
    let err = h
        .engine
        .approve_withdrawal(&h.admin, withdrawal.id)
        .unwrap_err();
    assert!(matches!(err, ArenaError::AlreadyProcessed { .. }));
}

// =============================================================================
// Test: A stuck deposit is failed without touching the balance
// =============================================================================
#[test]
fn scheduler_fails_stuck_deposit() {
    let h = Harness::new();
    let alice = h.player(0);
    let deposit = h
        .engine
        .request_deposit(&alice, coins(300), "bank ref")
        .expect("request");

    h.clock.advance(Duration::minutes(31));
    let report = hooks(&h).tick(SECRET).expect("tick");
    assert_eq!(report.expired, vec![deposit.id]);
    assert_eq!(
        h.engine.entry(deposit.id).unwrap().status,
        EntryStatus::Failed
    );
    assert_eq!(h.balance(alice.id), rust_decimal::Decimal::ZERO);
    assert!(
        h.sink
            .notifications_for(alice.id)
            .iter()
            .any(|n| n.title == "Deposit timed out")
    );
}

// =============================================================================
// Test: Triggers without the shared secret are refused
// =============================================================================
#[test]
fn scheduler_rejects_bad_secret() {
    let h = Harness::new();
    let tid = h.tournament(0, 0);
    h.clock.advance(Duration::hours(2));

    let err = hooks(&h).tick("guess").unwrap_err();
    assert!(matches!(err, ArenaError::InvalidSchedulerSecret));

    let unconfigured = SchedulerHooks::new(h.engine.clone(), &SchedulerConfig::default());
    let err = unconfigured.tick("").unwrap_err();
    assert!(matches!(err, ArenaError::InvalidSchedulerSecret));

    assert_eq!(
        h.engine.tournament(tid).unwrap().status,
        TournamentStatus::Open,
        "rejected triggers do nothing"
    );
}

// =============================================================================
// Test: The runner ticks until shutdown is signalled
// =============================================================================
#[tokio::test]
async fn scheduler_runner_stops_on_shutdown() {
    let h = Harness::new();
    let tid = h.tournament(0, 0);
    h.clock.advance(Duration::hours(2));

    let config = scheduler_config();
    let runner = SchedulerRunner::new(hooks(&h), &config);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(runner.run(stop_rx));

    // The first interval tick fires immediately
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    stop_tx.send(true).expect("runner is listening");
    let ticks = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("runner stopped in time")
        .expect("runner task");

    assert!(ticks >= 1);
    assert_eq!(
        h.engine.tournament(tid).unwrap().status,
        TournamentStatus::Live
    );
}
