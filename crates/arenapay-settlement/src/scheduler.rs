//! Scheduler hooks: time-driven settlement without a live request.
//!
//! Two hooks, both safe to re-run at any time:
//!
//! - **auto-start**: `Open` tournaments whose start time has passed go `Live`
//!   and their participants are notified
//! - **stuck timeout**: `pending` deposits and withdrawals older than the
//!   timeout are `failed`; a withdrawal's held funds are returned
//!
//! Each tournament and each entry is handled in its own unit. A failure is
//! logged and left for the next tick.
//!
//! External triggers must present the shared secret. With no secret
//! configured every trigger is refused.

use std::time::Duration;

use arenapay_types::{
    ArenaError, EntryId, EntryKind, EntryStatus, Notification, NotificationKind, Result,
    SchedulerConfig, TournamentId, TournamentStatus, constants,
};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

use crate::engine::SettlementEngine;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub started: Vec<TournamentId>,
    pub expired: Vec<EntryId>,
}

#[derive(Clone)]
pub struct SchedulerHooks {
    engine: SettlementEngine,
    /// SHA-256 of the configured secret.
    secret_digest: Option<[u8; 32]>,
}

impl SchedulerHooks {
    #[must_use]
    pub fn new(engine: SettlementEngine, config: &SchedulerConfig) -> Self {
        Self {
            engine,
            secret_digest: config.shared_secret.as_deref().map(digest),
        }
    }

    /// # Errors
    /// `InvalidSchedulerSecret` if no secret is configured or `presented`
    /// does not match it.
    pub fn authorize(&self, presented: &str) -> Result<()> {
        // Digest comparison keeps the check independent of where the inputs differ.
        match self.secret_digest {
            Some(expected) if expected == digest(presented) => Ok(()),
            _ => {
                tracing::warn!("scheduler trigger rejected");
                Err(ArenaError::InvalidSchedulerSecret)
            }
        }
    }

    /// Authorized entry point for the external trigger.
    pub fn tick(&self, presented_secret: &str) -> Result<TickReport> {
        self.authorize(presented_secret)?;
        let report = TickReport {
            started: self.auto_start()?,
            expired: self.expire_stuck()?,
        };
        tracing::debug!(
            started = report.started.len(),
            expired = report.expired.len(),
            "scheduler tick"
        );
        Ok(report)
    }

    /// Move due `Open` tournaments to `Live`.
    pub fn auto_start(&self) -> Result<Vec<TournamentId>> {
        let now = self.engine.now();
        let due: Vec<TournamentId> = self.engine.store().read(|state| {
            state
                .tournaments()
                .filter(|t| t.status == TournamentStatus::Open && t.start_time <= now)
                .map(|t| t.id)
                .collect()
        })?;

        let mut started = Vec::new();
        for tournament_id in due {
            let outcome = self.engine.store().transaction(|tx| {
                let tournament = tx.tournament_mut(tournament_id)?;
                // Re-checked inside the unit: an admin may have acted since the scan.
                if tournament.status != TournamentStatus::Open {
                    return Ok(false);
                }
                tournament.transition(TournamentStatus::Live)?;
                let title = tournament.title.clone();
                let participants: Vec<_> =
                    tournament.participants.iter().map(|p| p.user_id).collect();
                for user_id in participants {
                    tx.notify(Notification::new(
                        user_id,
                        NotificationKind::Tournament,
                        "Tournament is live",
                        format!("{title} has started. Good luck!"),
                    ));
                }
                Ok(true)
            });
            match outcome {
                Ok(committed) => {
                    if self.engine.dispatch(committed) {
                        tracing::info!(tournament = %tournament_id, "tournament auto-started");
                        started.push(tournament_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        tournament = %tournament_id,
                        error = %e,
                        "auto-start failed"
                    );
                }
            }
        }
        Ok(started)
    }

    /// Fail reviewable entries that stayed pending past the timeout.
    pub fn expire_stuck(&self) -> Result<Vec<EntryId>> {
        let now = self.engine.now();
        let cutoff = now - self.engine.config().stuck_entry_timeout();
        let stuck = self
            .engine
            .store()
            .read(|state| state.ledger.pending_created_before(cutoff))?;

        let mut expired = Vec::new();
        for entry_id in stuck {
            let outcome = self.engine.store().transaction(|tx| {
                if tx.ledger.entry(entry_id)?.status != EntryStatus::Pending {
                    return Ok(false);
                }
                let entry = tx
                    .ledger
                    .transition(
                        entry_id,
                        EntryStatus::Failed,
                        Some(constants::STUCK_ENTRY_REASON.to_string()),
                        now,
                    )?
                    .clone();
                if entry.kind == EntryKind::Withdrawal {
                    tx.accounts.credit(entry.user_id, entry.amount)?;
                }
                tx.notify(Notification::new(
                    entry.user_id,
                    NotificationKind::Wallet,
                    format!("{} timed out", capitalize(entry.kind.as_str())),
                    if entry.kind == EntryKind::Withdrawal {
                        format!(
                            "Your withdrawal of {} timed out and was returned to your wallet.",
                            entry.amount
                        )
                    } else {
                        format!(
                            "Your deposit of {} timed out. Please submit it again.",
                            entry.amount
                        )
                    },
                ));
                Ok(true)
            });
            match outcome {
                Ok(committed) => {
                    if self.engine.dispatch(committed) {
                        tracing::info!(entry = %entry_id, "stuck entry failed");
                        expired.push(entry_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        entry = %entry_id,
                        error = %e,
                        "stuck-entry timeout failed"
                    );
                }
            }
        }
        Ok(expired)
    }
}

fn digest(secret: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// SchedulerRunner
// ---------------------------------------------------------------------------

/// In-process trigger: ticks the hooks on a fixed interval until shutdown.
pub struct SchedulerRunner {
    hooks: SchedulerHooks,
    period: Duration,
    secret: String,
}

impl SchedulerRunner {
    #[must_use]
    pub fn new(hooks: SchedulerHooks, config: &SchedulerConfig) -> Self {
        Self {
            hooks,
            period: Duration::from_secs(config.interval_secs.max(1)),
            secret: config.shared_secret.clone().unwrap_or_default(),
        }
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped.
    /// Returns the number of ticks that ran.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0u64;
        tracing::info!(period_secs = self.period.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ticks += 1;
                    if let Err(e) = self.hooks.tick(&self.secret) {
                        tracing::warn!(error = %e, "scheduler tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(ticks, "scheduler stopped");
        ticks
    }
}
