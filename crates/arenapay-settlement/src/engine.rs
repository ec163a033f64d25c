//! Settlement engine: every balance-moving business operation.
//!
//! Each operation is one named transition executed as a single
//! [`WalletStore::transaction`]:
//!
//! ```text
//! authorize ─→ admit ─→ tx { preconditions ─→ idempotency ─→ balance ±
//!                            ─→ ledger append ─→ entity update }
//!                            │
//!                            └─ any Err ─→ nothing committed
//! commit ─→ notifications + admin actions ─→ sinks (best effort)
//! ```
//!
//! The engine is the only writer of balances and ledger entries. Balance
//! mutations always go through the conditional primitives of
//! [`arenapay_ledger::BalanceStore`], never read-modify-write.

use std::sync::Arc;

use arenapay_ledger::{Committed, IdempotencyKey, Reservation, Transaction, WalletStore};
use arenapay_types::{
    Actor, AdminAction, AdminActionType, ArenaError, AuditSink, Clock, Direction, EntryId,
    EntryKind, EntryStatus, LedgerEntry, NewTournament, Notification, NotificationKind,
    NotificationSink, Order, OrderId, OrderSource, OrderStatus, Participant, Product, ProductId,
    ReferenceId, Result, Role, SpinItem, SpinPrize, SystemClock, Tournament, TournamentId,
    TournamentStatus, UserAccount, UserId, WalletConfig, Winner,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;

use crate::retry::with_retry;
use crate::settings::{MaintenanceGate, SettingsStore};
use crate::spin::select_weighted;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of an idempotent settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The effect was written by this call.
    Applied(EntryId),
    /// The effect already existed; nothing was changed.
    AlreadyApplied,
}

impl Settlement {
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub fn entry_id(self) -> Option<EntryId> {
        match self {
            Self::Applied(id) => Some(id),
            Self::AlreadyApplied => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelOutcome {
    pub refunded: Vec<(UserId, Decimal)>,
    /// Participants whose refund already existed.
    pub already_refunded: Vec<UserId>,
    /// The tournament was already cancelled; nothing was done.
    pub already_cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub paid: Vec<(UserId, Decimal)>,
    /// Winners whose prize entry already existed.
    pub already_paid: Vec<UserId>,
    /// The tournament was already completed; nothing was done.
    pub already_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRejection {
    pub entry: LedgerEntry,
    pub fraud_strikes: u8,
    /// This rejection banned the account.
    pub banned: bool,
}

#[derive(Debug, Clone)]
pub struct OrderRejection {
    pub order: Order,
    pub refund: Option<EntryId>,
    /// The order was already rejected; nothing was done.
    pub already_rejected: bool,
}

#[derive(Debug, Clone)]
pub struct SpinResult {
    pub item: SpinItem,
    /// `spin_win` entry for coin prizes.
    pub credited: Option<EntryId>,
    /// Fulfillment order for product prizes.
    pub order: Option<OrderId>,
    pub spins_left: u32,
}

// ---------------------------------------------------------------------------
// Default sink
// ---------------------------------------------------------------------------

/// Sink that writes notifications and audit records to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: &Notification) -> Result<()> {
        tracing::info!(user = %n.user_id, kind = ?n.kind, title = %n.title, "notification");
        Ok(())
    }
}

impl AuditSink for TracingSink {
    fn record_admin_action(&self, a: &AdminAction) -> Result<()> {
        tracing::info!(
            admin = ?a.admin_id,
            action = %a.action,
            target = %a.target_id,
            details = %a.details,
            "admin action"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SettlementEngine
// ---------------------------------------------------------------------------

/// Cheap to clone; every clone shares the same store and sinks.
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<WalletStore>,
    config: Arc<WalletConfig>,
    notifier: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    maintenance: Arc<dyn MaintenanceGate>,
    clock: Arc<dyn Clock>,
}

impl SettlementEngine {
    /// Engine with log-only sinks, the system clock and maintenance off.
    ///
    /// # Errors
    /// Returns `Configuration` if `config` does not validate.
    pub fn new(store: Arc<WalletStore>, config: WalletConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config: Arc::new(config),
            notifier: Arc::new(TracingSink),
            audit: Arc::new(TracingSink),
            maintenance: Arc::new(SettingsStore::default()),
            clock: Arc::new(SystemClock),
        })
    }

    #[must_use]
    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = sink;
        self
    }

    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    #[must_use]
    pub fn with_maintenance_gate(mut self, gate: Arc<dyn MaintenanceGate>) -> Self {
        self.maintenance = gate;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &WalletStore {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Deliver the effects of a committed unit. Failures are logged only:
    /// the settlement is already durable.
    pub(crate) fn dispatch<T>(&self, committed: Committed<T>) -> T {
        for notification in &committed.notifications {
            if let Err(e) = self.notifier.notify(notification) {
                tracing::warn!(
                    user = %notification.user_id,
                    title = %notification.title,
                    error = %e,
                    "notification delivery failed"
                );
            }
        }
        for action in &committed.admin_actions {
            if let Err(e) = self.audit.record_admin_action(action) {
                tracing::warn!(
                    action = %action.action,
                    target = %action.target_id,
                    error = %e,
                    "audit record delivery failed"
                );
            }
        }
        committed.value
    }

    /// Run a user- or admin-initiated unit with bounded retry on transient
    /// store failures, then dispatch its effects.
    fn execute<T, F>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T>,
    {
        let committed = with_retry(self.config.retry_attempts, operation, || {
            self.store.transaction(&mut f)
        })?;
        Ok(self.dispatch(committed))
    }

    fn ensure_admitting(&self) -> Result<()> {
        if self.maintenance.maintenance_mode() {
            return Err(ArenaError::MaintenanceMode);
        }
        Ok(())
    }

    // =======================================================================
    // Accounts
    // =======================================================================

    pub fn open_account(&self, user_id: UserId, role: Role) -> Result<UserAccount> {
        let now = self.now();
        let account = self.execute("open_account", |tx| {
            let account = UserAccount::new(user_id, role, now);
            tx.accounts.open(account.clone())?;
            Ok(account)
        })?;
        tracing::info!(user = %user_id, ?role, "account opened");
        Ok(account)
    }

    /// Admin credit or debit. Not idempotent: every call is a new action.
    pub fn admin_adjust(
        &self,
        actor: &Actor,
        user_id: UserId,
        direction: Direction,
        amount: Decimal,
        reason: &str,
    ) -> Result<LedgerEntry> {
        actor.require_admin("adjust balance")?;
        ensure_positive(amount)?;
        let now = self.now();
        let entry = self.execute("admin_adjust", |tx| {
            match direction {
                Direction::Credit => tx.accounts.credit(user_id, amount)?,
                Direction::Debit => tx.accounts.try_debit(user_id, amount)?,
            };
            let entry = LedgerEntry::new(
                user_id,
                EntryKind::AdminAdjustment(direction),
                amount,
                EntryStatus::Approved,
                now,
            )
            .with_description(reason);
            tx.ledger.append(entry.clone())?;
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::AdjustBalance,
                user_id,
                format!("{direction} {amount}: {reason}"),
                now,
            ));
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Balance adjusted",
                format!("An administrator applied a {direction} of {amount}."),
            ));
            Ok(entry)
        })?;
        tracing::info!(
            user = %user_id,
            %direction,
            %amount,
            entry = %entry.id,
            "balance adjusted"
        );
        Ok(entry)
    }

    // =======================================================================
    // Tournaments
    // =======================================================================

    pub fn create_tournament(&self, actor: &Actor, input: NewTournament) -> Result<Tournament> {
        actor.require_admin("create tournament")?;
        let now = self.now();
        let tournament = self.execute("create_tournament", |tx| {
            let tournament = Tournament::open(input.clone(), now)?;
            tx.insert_tournament(tournament.clone());
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::CreateTournament,
                tournament.id,
                format!(
                    "{} fee={} slots={}",
                    tournament.title, tournament.entry_fee, tournament.max_slots
                ),
                now,
            ));
            Ok(tournament)
        })?;
        tracing::info!(
            tournament = %tournament.id,
            title = %tournament.title,
            "tournament created"
        );
        Ok(tournament)
    }

    /// Register the caller, charging the entry fee.
    ///
    /// Checks, in order: maintenance, account active, tournament open,
    /// slots left, not already joined, game uid free, balance ≥ fee.
    pub fn join_tournament(
        &self,
        actor: &Actor,
        tournament_id: TournamentId,
        game_uid: &str,
        in_game_name: &str,
    ) -> Result<Participant> {
        self.ensure_admitting()?;
        let user_id = actor.id;
        let now = self.now();
        let participant = self.execute("join_tournament", |tx| {
            tx.accounts.account(user_id)?.ensure_active()?;
            let tournament = tx.tournament(tournament_id)?;
            tournament.check_joinable(user_id, game_uid)?;
            let fee = tournament.entry_fee;
            let title = tournament.title.clone();

            // Free tournaments leave no trace in the ledger.
            if fee > Decimal::ZERO {
                tx.accounts.try_debit(user_id, fee)?;
                tx.ledger.append(
                    LedgerEntry::new(
                        user_id,
                        EntryKind::EntryFee,
                        fee,
                        EntryStatus::Approved,
                        now,
                    )
                    .with_reference(tournament_id)
                    .with_description(format!("Entry fee: {title}")),
                )?;
            }

            let participant = Participant {
                user_id,
                game_uid: game_uid.trim().to_string(),
                in_game_name: in_game_name.trim().to_string(),
                joined_at: now,
            };
            tx.tournament_mut(tournament_id)?
                .add_participant(participant.clone())?;
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Tournament,
                "Registration confirmed",
                format!("You joined {title}."),
            ));
            Ok(participant)
        })?;
        tracing::info!(user = %user_id, tournament = %tournament_id, "joined tournament");
        Ok(participant)
    }

    /// Cancel an Open or Live tournament and refund every paid entry fee
    /// once. Cancelling a cancelled tournament is a no-op.
    pub fn cancel_tournament(
        &self,
        actor: &Actor,
        tournament_id: TournamentId,
    ) -> Result<CancelOutcome> {
        actor.require_admin("cancel tournament")?;
        let now = self.now();
        let outcome = self.execute("cancel_tournament", |tx| {
            let tournament = tx.tournament(tournament_id)?;
            match tournament.status {
                TournamentStatus::Cancelled => {
                    return Ok(CancelOutcome {
                        already_cancelled: true,
                        ..CancelOutcome::default()
                    });
                }
                TournamentStatus::Completed => {
                    return Err(ArenaError::InvalidTournamentTransition {
                        from: TournamentStatus::Completed,
                        to: TournamentStatus::Cancelled,
                    });
                }
                TournamentStatus::Open | TournamentStatus::Live => {}
            }
            let title = tournament.title.clone();
            let participants: Vec<UserId> =
                tournament.participants.iter().map(|p| p.user_id).collect();

            let mut outcome = CancelOutcome::default();
            for user_id in participants {
                // The refund returns what this participant actually paid.
                let paid = tx
                    .ledger
                    .find(user_id, EntryKind::EntryFee, tournament_id.into())
                    .map(|fee| fee.amount);
                if let Some(amount) = paid {
                    let key = IdempotencyKey::new(EntryKind::Refund, tournament_id, user_id);
                    match tx.check_and_reserve(key) {
                        Reservation::Allowed => {
                            tx.accounts.credit(user_id, amount)?;
                            tx.ledger.append(
                                LedgerEntry::new(
                                    user_id,
                                    EntryKind::Refund,
                                    amount,
                                    EntryStatus::Approved,
                                    now,
                                )
                                .with_reference(tournament_id)
                                .with_description(format!("Refund: {title} cancelled")),
                            )?;
                            outcome.refunded.push((user_id, amount));
                        }
                        Reservation::Duplicate(_) | Reservation::ReservedInTransaction => {
                            outcome.already_refunded.push(user_id);
                        }
                    }
                }
                tx.notify(Notification::new(
                    user_id,
                    NotificationKind::Tournament,
                    "Tournament cancelled",
                    match paid {
                        Some(amount) => format!("{title} was cancelled. {amount} coins refunded."),
                        None => format!("{title} was cancelled."),
                    },
                ));
            }

            tx.tournament_mut(tournament_id)?
                .transition(TournamentStatus::Cancelled)?;
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::CancelTournament,
                tournament_id,
                format!("refunded {} participants", outcome.refunded.len()),
                now,
            ));
            Ok(outcome)
        })?;
        tracing::info!(
            tournament = %tournament_id,
            refunded = outcome.refunded.len(),
            already_refunded = outcome.already_refunded.len(),
            noop = outcome.already_cancelled,
            "tournament cancelled"
        );
        Ok(outcome)
    }

    /// Record the winners, pay each ranked prize once, and complete the
    /// tournament. Finalizing a completed tournament is a no-op.
    pub fn finalize_tournament(
        &self,
        actor: &Actor,
        tournament_id: TournamentId,
        winners: &[Winner],
    ) -> Result<FinalizeOutcome> {
        actor.require_admin("finalize tournament")?;
        let now = self.now();
        let outcome = self.execute("finalize_tournament", |tx| {
            let tournament = tx.tournament(tournament_id)?;
            match tournament.status {
                TournamentStatus::Completed => {
                    return Ok(FinalizeOutcome {
                        already_completed: true,
                        ..FinalizeOutcome::default()
                    });
                }
                TournamentStatus::Cancelled => {
                    return Err(ArenaError::InvalidTournamentTransition {
                        from: TournamentStatus::Cancelled,
                        to: TournamentStatus::Completed,
                    });
                }
                TournamentStatus::Open | TournamentStatus::Live => {}
            }
            tournament.validate_winners(winners)?;
            let title = tournament.title.clone();
            let prizes = tournament.prizes;

            let mut outcome = FinalizeOutcome::default();
            for winner in winners {
                let prize = prizes.prize_for_rank(winner.rank);
                if prize <= Decimal::ZERO {
                    continue;
                }
                match settle_prize(tx, winner.user_id, tournament_id, &title, prize, now)? {
                    Settlement::Applied(_) => outcome.paid.push((winner.user_id, prize)),
                    Settlement::AlreadyApplied => outcome.already_paid.push(winner.user_id),
                }
            }

            let tournament = tx.tournament_mut(tournament_id)?;
            tournament.winners = winners.to_vec();
            tournament.transition(TournamentStatus::Completed)?;
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::FinalizeTournament,
                tournament_id,
                format!("paid {} winners", outcome.paid.len()),
                now,
            ));
            Ok(outcome)
        })?;
        tracing::info!(
            tournament = %tournament_id,
            paid = outcome.paid.len(),
            already_paid = outcome.already_paid.len(),
            noop = outcome.already_completed,
            "tournament finalized"
        );
        Ok(outcome)
    }

    /// Pay one prize outside of finalization. At most one prize entry ever
    /// exists per (tournament, user).
    pub fn award_prize(
        &self,
        actor: &Actor,
        tournament_id: TournamentId,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Settlement> {
        actor.require_admin("award prize")?;
        ensure_positive(amount)?;
        let now = self.now();
        let settlement = self.execute("award_prize", |tx| {
            let tournament = tx.tournament(tournament_id)?;
            if tournament.status == TournamentStatus::Cancelled {
                return Err(ArenaError::InvalidTournament {
                    reason: format!("{tournament_id} is cancelled"),
                });
            }
            let title = tournament.title.clone();
            let settlement = settle_prize(tx, user_id, tournament_id, &title, amount, now)?;
            if settlement.is_applied() {
                tx.record_admin_action(audit_record(
                    Some(actor.id),
                    AdminActionType::AwardPrize,
                    user_id,
                    format!("{amount} for {tournament_id}"),
                    now,
                ));
            }
            Ok(settlement)
        })?;
        tracing::info!(
            user = %user_id,
            tournament = %tournament_id,
            %amount,
            ?settlement,
            "prize award"
        );
        Ok(settlement)
    }

    /// Credit a leaderboard reward once per (reference, user).
    pub fn rank_reward(
        &self,
        actor: &Actor,
        user_id: UserId,
        reference: ReferenceId,
        amount: Decimal,
        description: &str,
    ) -> Result<Settlement> {
        actor.require_admin("rank reward")?;
        ensure_positive(amount)?;
        let now = self.now();
        let settlement = self.execute("rank_reward", |tx| {
            let key = IdempotencyKey::new(EntryKind::RankReward, reference, user_id);
            if let Reservation::Duplicate(_) | Reservation::ReservedInTransaction =
                tx.check_and_reserve(key)
            {
                return Ok(Settlement::AlreadyApplied);
            }
            tx.accounts.credit(user_id, amount)?;
            let id = tx.ledger.append(
                LedgerEntry::new(
                    user_id,
                    EntryKind::RankReward,
                    amount,
                    EntryStatus::Approved,
                    now,
                )
                .with_reference(reference)
                .with_description(description),
            )?;
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::RankReward,
                user_id,
                format!("{amount}: {description}"),
                now,
            ));
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Rank reward",
                format!("You received {amount} coins: {description}"),
            ));
            Ok(Settlement::Applied(id))
        })?;
        tracing::info!(
            user = %user_id,
            reference = %reference,
            %amount,
            ?settlement,
            "rank reward"
        );
        Ok(settlement)
    }

    // =======================================================================
    // Deposits and withdrawals
    // =======================================================================

    /// Record a deposit awaiting admin review. The balance is unchanged
    /// until approval.
    pub fn request_deposit(
        &self,
        actor: &Actor,
        amount: Decimal,
        note: &str,
    ) -> Result<LedgerEntry> {
        ensure_positive(amount)?;
        let user_id = actor.id;
        let now = self.now();
        let entry = self.execute("request_deposit", |tx| {
            tx.accounts.account(user_id)?.ensure_active()?;
            let entry = LedgerEntry::new(
                user_id,
                EntryKind::Deposit,
                amount,
                EntryStatus::Pending,
                now,
            )
            .with_description(note);
            tx.ledger.append(entry.clone())?;
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Deposit submitted",
                format!("Your deposit of {amount} is awaiting review."),
            ));
            Ok(entry)
        })?;
        tracing::info!(user = %user_id, %amount, entry = %entry.id, "deposit requested");
        Ok(entry)
    }

    /// Approve a pending deposit, optionally correcting its amount first.
    pub fn approve_deposit(
        &self,
        actor: &Actor,
        entry_id: EntryId,
        adjusted_amount: Option<Decimal>,
    ) -> Result<LedgerEntry> {
        actor.require_admin("approve deposit")?;
        if let Some(amount) = adjusted_amount {
            ensure_positive(amount)?;
        }
        let now = self.now();
        let entry = self.execute("approve_deposit", |tx| {
            let user_id = expect_kind(tx.ledger.entry(entry_id)?, EntryKind::Deposit)?;
            if let Some(amount) = adjusted_amount {
                tx.ledger.amend_pending_amount(entry_id, amount)?;
            }
            let entry = tx
                .ledger
                .transition(entry_id, EntryStatus::Approved, None, now)?
                .clone();
            tx.accounts.credit(user_id, entry.amount)?;
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::ApproveDeposit,
                entry_id,
                format!("{} for {user_id}", entry.amount),
                now,
            ));
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Deposit approved",
                format!("{} coins were added to your wallet.", entry.amount),
            ));
            Ok(entry)
        })?;
        tracing::info!(
            user = %entry.user_id,
            amount = %entry.amount,
            entry = %entry_id,
            "deposit approved"
        );
        Ok(entry)
    }

    /// Reject a pending deposit. A fraudulent rejection adds a strike and
    /// bans the account at the configured threshold.
    pub fn reject_deposit(
        &self,
        actor: &Actor,
        entry_id: EntryId,
        reason: &str,
        fraudulent: bool,
    ) -> Result<DepositRejection> {
        actor.require_admin("reject deposit")?;
        let threshold = self.config.fraud_strike_ban_threshold;
        let now = self.now();
        let rejection = self.execute("reject_deposit", |tx| {
            let user_id = expect_kind(tx.ledger.entry(entry_id)?, EntryKind::Deposit)?;
            let entry = tx
                .ledger
                .transition(
                    entry_id,
                    EntryStatus::Rejected,
                    Some(reason.to_string()),
                    now,
                )?
                .clone();
            let banned = if fraudulent {
                tx.accounts.add_fraud_strike(user_id, threshold)?
            } else {
                false
            };
            let fraud_strikes = tx.accounts.account(user_id)?.fraud_strikes;

            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::RejectDeposit,
                entry_id,
                format!("{reason} (fraud: {fraudulent})"),
                now,
            ));
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Deposit rejected",
                format!("Your deposit of {} was rejected: {reason}", entry.amount),
            ));
            if banned {
                tx.record_admin_action(audit_record(
                    Some(actor.id),
                    AdminActionType::BanUser,
                    user_id,
                    format!("{fraud_strikes} fraud strikes"),
                    now,
                ));
                tx.notify(Notification::new(
                    user_id,
                    NotificationKind::System,
                    "Account suspended",
                    "Your account was suspended after repeated fraudulent deposits.",
                ));
            }
            Ok(DepositRejection {
                entry,
                fraud_strikes,
                banned,
            })
        })?;
        tracing::info!(
            user = %rejection.entry.user_id,
            entry = %entry_id,
            fraudulent,
            banned = rejection.banned,
            "deposit rejected"
        );
        if rejection.banned {
            tracing::warn!(
                user = %rejection.entry.user_id,
                strikes = rejection.fraud_strikes,
                "account banned"
            );
        }
        Ok(rejection)
    }

    /// Deduct `amount` now and record a pending withdrawal.
    ///
    /// Checks, in order: maintenance, amount, account active, minimum,
    /// balance, daily limit.
    pub fn request_withdrawal(&self, actor: &Actor, amount: Decimal) -> Result<LedgerEntry> {
        self.ensure_admitting()?;
        ensure_positive(amount)?;
        let user_id = actor.id;
        let now = self.now();
        let (day_start, day_end) = self.config.day_window(now)?;
        let minimum = self.config.min_withdrawal;
        let limit = self.config.daily_withdrawal_limit;
        let entry = self.execute("request_withdrawal", |tx| {
            tx.accounts.account(user_id)?.ensure_active()?;
            if amount < minimum {
                return Err(ArenaError::BelowMinimumWithdrawal {
                    requested: amount,
                    minimum,
                });
            }
            tx.accounts.try_debit(user_id, amount)?;
            let used = tx.ledger.withdrawals_between(user_id, day_start, day_end);
            if used + amount > limit {
                return Err(ArenaError::DailyLimitExceeded {
                    used,
                    requested: amount,
                    limit,
                });
            }
            let entry = LedgerEntry::new(
                user_id,
                EntryKind::Withdrawal,
                amount,
                EntryStatus::Pending,
                now,
            )
            .with_description("Withdrawal request");
            tx.ledger.append(entry.clone())?;
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Withdrawal requested",
                format!("Your withdrawal of {amount} is awaiting review."),
            ));
            Ok(entry)
        })?;
        tracing::info!(user = %user_id, %amount, entry = %entry.id, "withdrawal requested");
        Ok(entry)
    }

    /// Approve a pending withdrawal. The funds already left the balance at
    /// request time.
    pub fn approve_withdrawal(&self, actor: &Actor, entry_id: EntryId) -> Result<LedgerEntry> {
        actor.require_admin("approve withdrawal")?;
        let now = self.now();
        let entry = self.execute("approve_withdrawal", |tx| {
            let user_id = expect_kind(tx.ledger.entry(entry_id)?, EntryKind::Withdrawal)?;
            let entry = tx
                .ledger
                .transition(entry_id, EntryStatus::Approved, None, now)?
                .clone();
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::ApproveWithdrawal,
                entry_id,
                format!("{} for {user_id}", entry.amount),
                now,
            ));
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Withdrawal approved",
                format!("Your withdrawal of {} was approved.", entry.amount),
            ));
            Ok(entry)
        })?;
        tracing::info!(
            user = %entry.user_id,
            amount = %entry.amount,
            entry = %entry_id,
            "withdrawal approved"
        );
        Ok(entry)
    }

    /// Reject a pending withdrawal and return the held funds.
    pub fn reject_withdrawal(
        &self,
        actor: &Actor,
        entry_id: EntryId,
        reason: &str,
    ) -> Result<LedgerEntry> {
        actor.require_admin("reject withdrawal")?;
        let now = self.now();
        let entry = self.execute("reject_withdrawal", |tx| {
            let user_id = expect_kind(tx.ledger.entry(entry_id)?, EntryKind::Withdrawal)?;
            let entry = tx
                .ledger
                .transition(
                    entry_id,
                    EntryStatus::Rejected,
                    Some(reason.to_string()),
                    now,
                )?
                .clone();
            tx.accounts.credit(user_id, entry.amount)?;
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::RejectWithdrawal,
                entry_id,
                reason.to_string(),
                now,
            ));
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Wallet,
                "Withdrawal rejected",
                format!(
                    "{} coins were returned to your wallet: {reason}",
                    entry.amount
                ),
            ));
            Ok(entry)
        })?;
        tracing::info!(
            user = %entry.user_id,
            amount = %entry.amount,
            entry = %entry_id,
            "withdrawal rejected"
        );
        Ok(entry)
    }

    // =======================================================================
    // Store and spins
    // =======================================================================

    pub fn upsert_product(&self, actor: &Actor, product: Product) -> Result<Product> {
        actor.require_admin("upsert product")?;
        product.validate()?;
        let now = self.now();
        self.execute("upsert_product", |tx| {
            tx.insert_product(product.clone());
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::UpsertProduct,
                product.id,
                format!(
                    "{} price={} active={}",
                    product.name, product.price, product.is_active
                ),
                now,
            ));
            Ok(product.clone())
        })
    }

    /// Replace the spin wheel.
    pub fn set_spin_items(&self, actor: &Actor, items: Vec<SpinItem>) -> Result<()> {
        actor.require_admin("set spin items")?;
        for item in &items {
            item.validate()?;
        }
        let now = self.now();
        self.execute("set_spin_items", |tx| {
            tx.replace_spin_items(items.clone());
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::SetSpinItems,
                "spin-wheel",
                format!("{} items", items.len()),
                now,
            ));
            Ok(())
        })
    }

    pub fn grant_spins(&self, actor: &Actor, user_id: UserId, count: u32) -> Result<u32> {
        actor.require_admin("grant spins")?;
        if count == 0 {
            return Err(ArenaError::InvalidAmount(Decimal::ZERO));
        }
        let now = self.now();
        self.execute("grant_spins", |tx| {
            let spins = tx.accounts.grant_spins(user_id, count)?;
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::GrantSpins,
                user_id,
                count.to_string(),
                now,
            ));
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Spin,
                "Free spins",
                format!("You received {count} lucky spins."),
            ));
            Ok(spins)
        })
    }

    /// Buy a product with coins. Creates a pending fulfillment order.
    pub fn purchase(&self, actor: &Actor, product_id: ProductId) -> Result<Order> {
        let user_id = actor.id;
        let now = self.now();
        let order = self.execute("purchase", |tx| {
            tx.accounts.account(user_id)?.ensure_active()?;
            let product = tx.product(product_id)?;
            if !product.is_active {
                return Err(ArenaError::ProductInactive(product_id));
            }
            let (name, price) = (product.name.clone(), product.price);

            tx.accounts.try_debit(user_id, price)?;
            let order = Order::pending(
                user_id,
                Some(product_id),
                name,
                price,
                OrderSource::Shop,
                now,
            );
            tx.ledger.append(
                LedgerEntry::new(
                    user_id,
                    EntryKind::ShopPurchase,
                    price,
                    EntryStatus::Approved,
                    now,
                )
                .with_reference(order.id)
                .with_description(format!("Purchase: {}", order.item_name)),
            )?;
            tx.insert_order(order.clone());
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Order,
                "Order placed",
                format!("Your order for {} is being processed.", order.item_name),
            ));
            Ok(order)
        })?;
        tracing::info!(
            user = %user_id,
            order = %order.id,
            amount = %order.price_paid,
            "purchase"
        );
        Ok(order)
    }

    pub fn approve_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        note: Option<&str>,
    ) -> Result<Order> {
        actor.require_admin("approve order")?;
        let now = self.now();
        let order = self.execute("approve_order", |tx| {
            tx.order_mut(order_id)?
                .resolve(OrderStatus::Approved, note.map(str::to_string), now)?;
            let order = tx.order(order_id)?.clone();
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::ApproveOrder,
                order_id,
                order.item_name.clone(),
                now,
            ));
            tx.notify(Notification::new(
                order.user_id,
                NotificationKind::Order,
                "Order delivered",
                format!("Your order for {} was approved.", order.item_name),
            ));
            Ok(order)
        })?;
        tracing::info!(order = %order_id, user = %order.user_id, "order approved");
        Ok(order)
    }

    /// Reject a pending order and refund what was paid, once. Rejecting a
    /// rejected order is a no-op.
    pub fn reject_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        note: &str,
    ) -> Result<OrderRejection> {
        actor.require_admin("reject order")?;
        let now = self.now();
        let rejection = self.execute("reject_order", |tx| {
            let order = tx.order(order_id)?.clone();
            match order.status {
                OrderStatus::Rejected => {
                    return Ok(OrderRejection {
                        order,
                        refund: None,
                        already_rejected: true,
                    });
                }
                OrderStatus::Approved => {
                    return Err(ArenaError::OrderAlreadyResolved {
                        order: order_id,
                        status: order.status.to_string(),
                    });
                }
                OrderStatus::Pending => {}
            }

            let mut refund = None;
            if order.price_paid > Decimal::ZERO {
                let key = IdempotencyKey::new(EntryKind::Refund, order_id, order.user_id);
                match tx.check_and_reserve(key) {
                    Reservation::Allowed => {
                        tx.accounts.credit(order.user_id, order.price_paid)?;
                        let id = tx.ledger.append(
                            LedgerEntry::new(
                                order.user_id,
                                EntryKind::Refund,
                                order.price_paid,
                                EntryStatus::Approved,
                                now,
                            )
                            .with_reference(order_id)
                            .with_description(format!("Refund: {}", order.item_name)),
                        )?;
                        refund = Some(id);
                    }
                    Reservation::Duplicate(existing) => refund = Some(existing),
                    Reservation::ReservedInTransaction => {}
                }
            }

            tx.order_mut(order_id)?
                .resolve(OrderStatus::Rejected, Some(note.to_string()), now)?;
            let order = tx.order(order_id)?.clone();
            tx.record_admin_action(audit_record(
                Some(actor.id),
                AdminActionType::RejectOrder,
                order_id,
                note.to_string(),
                now,
            ));
            tx.notify(Notification::new(
                order.user_id,
                NotificationKind::Order,
                "Order rejected",
                if order.price_paid > Decimal::ZERO {
                    format!(
                        "Your order for {} was rejected and {} coins refunded.",
                        order.item_name, order.price_paid
                    )
                } else {
                    format!("Your order for {} was rejected.", order.item_name)
                },
            ));
            Ok(OrderRejection {
                order,
                refund,
                already_rejected: false,
            })
        })?;
        tracing::info!(
            order = %order_id,
            user = %rejection.order.user_id,
            refunded = rejection.refund.is_some(),
            noop = rejection.already_rejected,
            "order rejected"
        );
        Ok(rejection)
    }

    /// Spend one spin on the wheel.
    pub fn spin(&self, actor: &Actor) -> Result<SpinResult> {
        let mut rng = rand::thread_rng();
        self.spin_with_rng(actor, &mut rng)
    }

    /// [`Self::spin`] with a caller-supplied random source.
    pub fn spin_with_rng<R: Rng>(&self, actor: &Actor, rng: &mut R) -> Result<SpinResult> {
        let user_id = actor.id;
        let now = self.now();
        let result = self.execute("spin", |tx| {
            tx.accounts.account(user_id)?.ensure_active()?;
            let spins_left = tx.accounts.consume_spin(user_id)?;
            let items: Vec<SpinItem> = tx.active_spin_items().cloned().collect();
            let item = select_weighted(&items, &mut *rng)
                .ok_or(ArenaError::NoSpinItems)?
                .clone();

            let mut credited = None;
            let mut order = None;
            match &item.prize {
                SpinPrize::Coins(amount) => {
                    tx.accounts.credit(user_id, *amount)?;
                    let id = tx.ledger.append(
                        LedgerEntry::new(
                            user_id,
                            EntryKind::SpinWin,
                            *amount,
                            EntryStatus::Approved,
                            now,
                        )
                        .with_description(format!("Lucky spin: {}", item.label)),
                    )?;
                    credited = Some(id);
                }
                SpinPrize::Product { name } => {
                    let prize_order = Order::pending(
                        user_id,
                        None,
                        name.clone(),
                        Decimal::ZERO,
                        OrderSource::Spin,
                        now,
                    );
                    order = Some(prize_order.id);
                    tx.insert_order(prize_order);
                }
                SpinPrize::Nothing => {}
            }
            tx.notify(Notification::new(
                user_id,
                NotificationKind::Spin,
                "Lucky spin",
                format!("You landed on {}.", item.label),
            ));
            Ok(SpinResult {
                item,
                credited,
                order,
                spins_left,
            })
        })?;
        tracing::info!(
            user = %user_id,
            item = %result.item.label,
            spins_left = result.spins_left,
            "spin"
        );
        Ok(result)
    }

    // =======================================================================
    // Queries
    // =======================================================================

    pub fn balance(&self, user_id: UserId) -> Result<Decimal> {
        self.store.read(|s| s.accounts.balance(user_id))?
    }

    pub fn account(&self, user_id: UserId) -> Result<UserAccount> {
        self.store.read(|s| s.accounts.account(user_id).cloned())?
    }

    pub fn entry(&self, entry_id: EntryId) -> Result<LedgerEntry> {
        self.store.read(|s| s.ledger.entry(entry_id).cloned())?
    }

    /// A user's ledger, oldest first.
    pub fn ledger_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        self.store.read(|s| -> Result<Vec<LedgerEntry>> {
            s.accounts.account(user_id)?;
            Ok(s.ledger
                .list_for_user(user_id)
                .into_iter()
                .cloned()
                .collect())
        })?
    }

    /// Settled prize winnings, summed from the ledger. The counter on the
    /// account is display-only.
    pub fn total_winnings(&self, user_id: UserId) -> Result<Decimal> {
        self.store.read(|s| -> Result<Decimal> {
            s.accounts.account(user_id)?;
            Ok(s.ledger
                .list_for_user(user_id)
                .into_iter()
                .filter(|e| e.kind == EntryKind::PrizeWinnings && e.is_settled())
                .map(|e| e.amount)
                .sum())
        })?
    }

    pub fn tournament(&self, tournament_id: TournamentId) -> Result<Tournament> {
        self.store.read(|s| s.tournament(tournament_id).cloned())?
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order> {
        self.store.read(|s| s.order(order_id).cloned())?
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pay `amount` to `user_id` for `tournament_id` unless a prize entry for
/// that pair already exists.
fn settle_prize(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    tournament_id: TournamentId,
    title: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Settlement> {
    let key = IdempotencyKey::new(EntryKind::PrizeWinnings, tournament_id, user_id);
    if let Reservation::Duplicate(_) | Reservation::ReservedInTransaction =
        tx.check_and_reserve(key)
    {
        return Ok(Settlement::AlreadyApplied);
    }
    tx.accounts.credit(user_id, amount)?;
    let id = tx.ledger.append(
        LedgerEntry::new(
            user_id,
            EntryKind::PrizeWinnings,
            amount,
            EntryStatus::Approved,
            now,
        )
        .with_reference(tournament_id)
        .with_description(format!("Prize: {title}")),
    )?;
    tx.accounts.record_win(user_id, amount)?;
    tx.notify(Notification::new(
        user_id,
        NotificationKind::Tournament,
        "Prize awarded",
        format!("You won {amount} coins in {title}."),
    ));
    Ok(Settlement::Applied(id))
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(ArenaError::InvalidAmount(amount));
    }
    Ok(())
}

/// Returns the entry's owner if its kind matches.
fn expect_kind(entry: &LedgerEntry, expected: EntryKind) -> Result<UserId> {
    if entry.kind != expected {
        return Err(ArenaError::EntryKindMismatch {
            expected,
            actual: entry.kind,
        });
    }
    Ok(entry.user_id)
}

pub(crate) fn audit_record(
    admin_id: Option<UserId>,
    action: AdminActionType,
    target: impl ToString,
    details: impl Into<String>,
    at: DateTime<Utc>,
) -> AdminAction {
    AdminAction {
        admin_id,
        action,
        target_id: target.to_string(),
        details: details.into(),
        recorded_at: at,
    }
}
