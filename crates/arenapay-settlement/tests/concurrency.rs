//! Concurrency tests: racing requests against one store.
//!
//! Every racer shares the same engine. The store serializes units, so
//! whichever racer commits second must observe the first one's effects.

mod common;

use std::sync::Barrier;
use std::thread;

use arenapay_settlement::Settlement;
use arenapay_types::*;

use common::{Harness, coins};

// =============================================================================
// Test: N concurrent prize awards produce one entry
// =============================================================================
#[test]
fn concurrent_award_prize_pays_once() {
    for racers in 3..=10 {
        let h = Harness::new();
        let alice = h.player(0);
        let tid = h.tournament(0, 50);
        let barrier = Barrier::new(racers);

        let results: Vec<_> = thread::scope(|s| {
            let mut handles = Vec::new();
            for _ in 0..racers {
                handles.push(s.spawn(|| {
                    barrier.wait();
                    h.engine.award_prize(&h.admin, tid, alice.id, coins(50))
                }));
            }
            handles
                .into_iter()
                .map(|handle| handle.join().expect("racer panicked"))
                .collect()
        });

        let applied = results
            .iter()
            .filter(|r| matches!(r, Ok(Settlement::Applied(_))))
            .count();
        let absorbed = results
            .iter()
            .filter(|r| matches!(r, Ok(Settlement::AlreadyApplied)))
            .count();
        assert_eq!(applied, 1, "{racers} racers: exactly one award applies");
        assert_eq!(absorbed, racers - 1);
        assert_eq!(h.entries_of(alice.id, EntryKind::PrizeWinnings).len(), 1);
        assert_eq!(h.balance(alice.id), coins(50));
    }
}

// =============================================================================
// Test: Two withdrawals racing for the same funds
// =============================================================================
#[test]
fn concurrent_withdrawals_cannot_overdraw() {
    let h = Harness::new();
    let alice = h.player(1000);
    let barrier = Barrier::new(2);

    let results: Vec<_> = thread::scope(|s| {
        let mut handles = Vec::new();
        for _ in 0..2 {
            handles.push(s.spawn(|| {
                barrier.wait();
                h.engine.request_withdrawal(&alice, coins(600))
            }));
        }
        handles
            .into_iter()
            .map(|handle| handle.join().expect("racer panicked"))
            .collect()
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(ArenaError::InsufficientBalance { .. })))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(insufficient, 1);
    assert_eq!(h.balance(alice.id), coins(400));

    let withdrawals = h.entries_of(alice.id, EntryKind::Withdrawal);
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].amount, coins(600));
    assert_eq!(withdrawals[0].status, EntryStatus::Pending);
}

// =============================================================================
// Test: Concurrent cancels refund each participant once
// =============================================================================
#[test]
fn concurrent_cancel_refunds_once() {
    let h = Harness::new();
    let players: Vec<Actor> = (0..4).map(|_| h.player(100)).collect();
    let tid = h.tournament(25, 200);
    for player in &players {
        h.join(player, tid);
    }
    let barrier = Barrier::new(3);

    let outcomes: Vec<_> = thread::scope(|s| {
        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(s.spawn(|| {
                barrier.wait();
                h.engine.cancel_tournament(&h.admin, tid)
            }));
        }
        handles
            .into_iter()
            .map(|handle| handle.join().expect("racer panicked").expect("cancel"))
            .collect()
    });

    assert_eq!(outcomes.iter().filter(|o| !o.already_cancelled).count(), 1);
    for player in &players {
        assert_eq!(h.entries_of(player.id, EntryKind::Refund).len(), 1);
        assert_eq!(h.balance(player.id), coins(100));
    }
}

// =============================================================================
// Test: Concurrent joins never exceed the slot count
// =============================================================================
#[test]
fn concurrent_joins_respect_slots() {
    let h = Harness::new();
    let tid = h
        .engine
        .create_tournament(
            &h.admin,
            NewTournament {
                title: "Duo".to_string(),
                entry_fee: coins(10),
                prizes: PrizeDistribution::default(),
                max_slots: 2,
                start_time: common::base_time(),
            },
        )
        .expect("tournament")
        .id;
    let players: Vec<Actor> = (0..6).map(|_| h.player(10)).collect();
    let barrier = Barrier::new(players.len());

    let joined = thread::scope(|s| {
        let mut handles = Vec::new();
        for (i, player) in players.iter().enumerate() {
            let (barrier, h) = (&barrier, &h);
            handles.push(s.spawn(move || {
                barrier.wait();
                h.engine
                    .join_tournament(player, tid, &format!("uid-{i}"), "P")
                    .is_ok()
            }));
        }
        handles
            .into_iter()
            .map(|handle| handle.join().expect("racer panicked"))
            .filter(|ok| *ok)
            .count()
    });

    assert_eq!(joined, 2);
    let tournament = h.engine.tournament(tid).unwrap();
    assert_eq!(tournament.joined_count, 2);
    assert_eq!(tournament.participants.len(), 2);
    let charged = players
        .iter()
        .filter(|p| h.balance(p.id).is_zero())
        .count();
    assert_eq!(charged, 2, "only the seated players paid");
}
