//! Shared harness for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use arenapay_ledger::WalletStore;
use arenapay_settlement::SettlementEngine;
use arenapay_types::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

/// Engine wired to a recording sink and a hand-driven clock.
pub struct Harness {
    /// Held directly so tests can corrupt state behind the engine's back.
    pub store: Arc<WalletStore>,
    pub engine: SettlementEngine,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub admin: Actor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(WalletConfig::default())
    }

    pub fn with_config(config: WalletConfig) -> Self {
        let store = Arc::new(WalletStore::new());
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(base_time()));
        let engine = SettlementEngine::new(store.clone(), config)
            .expect("default config validates")
            .with_notification_sink(sink.clone())
            .with_audit_sink(sink.clone())
            .with_clock(clock.clone());

        let admin = Actor::admin(UserId::new());
        engine
            .open_account(admin.id, Role::Admin)
            .expect("admin account opens");
        Self {
            store,
            engine,
            sink,
            clock,
            admin,
        }
    }

    /// Open a player account funded through an admin credit.
    pub fn player(&self, funds: i64) -> Actor {
        let player = Actor::player(UserId::new());
        self.engine
            .open_account(player.id, Role::Player)
            .expect("player account opens");
        if funds > 0 {
            self.engine
                .admin_adjust(
                    &self.admin,
                    player.id,
                    Direction::Credit,
                    coins(funds),
                    "seed funds",
                )
                .expect("seed credit");
        }
        player
    }

    /// Open tournament starting one hour after the harness base time.
    pub fn tournament(&self, fee: i64, first_prize: i64) -> TournamentId {
        self.engine
            .create_tournament(
                &self.admin,
                NewTournament {
                    title: "Friday Cup".to_string(),
                    entry_fee: coins(fee),
                    prizes: PrizeDistribution {
                        first: coins(first_prize),
                        second: Decimal::ZERO,
                        third: Decimal::ZERO,
                    },
                    max_slots: 16,
                    start_time: base_time() + Duration::hours(1),
                },
            )
            .expect("tournament created")
            .id
    }

    pub fn join(&self, player: &Actor, tournament_id: TournamentId) -> Participant {
        self.engine
            .join_tournament(
                player,
                tournament_id,
                &format!("uid-{}", player.id.0),
                "Player",
            )
            .expect("join succeeds")
    }

    pub fn balance(&self, user_id: UserId) -> Decimal {
        self.engine.balance(user_id).expect("account exists")
    }

    pub fn entries_of(&self, user_id: UserId, kind: EntryKind) -> Vec<LedgerEntry> {
        self.engine
            .ledger_for_user(user_id)
            .expect("account exists")
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

pub fn coins(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

/// 2026-05-01 12:00 UTC.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
}
