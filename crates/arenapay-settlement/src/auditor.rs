//! Reconciliation auditor: detects and corrects balance drift.
//!
//! For every user the auditor recomputes the balance from the ledger and
//! compares it to the stored balance:
//! ```text
//! drift = stored - Σ balance_effect(entry)
//! ```
//!
//! Drift within `drift_epsilon` is ignored. In execute mode each drift is
//! closed with one backdated `admin_adjustment` entry tagged as a
//! reconciliation correction, so the ledger explains the stored balance.
//! The stored balance itself is never touched: the cause of the drift
//! stays visible in the ledger.

use arenapay_ledger::{IdempotencyKey, StoreState};
use arenapay_types::{
    AdminActionType, Direction, EntryId, EntryKind, EntryStatus, EntryTag, LedgerEntry,
    ReferenceId, Result, UserId, computed_balance, constants,
};
use rust_decimal::Decimal;

use crate::engine::{SettlementEngine, audit_record};

/// One user whose stored balance disagrees with the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftRow {
    pub user_id: UserId,
    pub stored: Decimal,
    pub computed: Decimal,
    /// `stored - computed`.
    pub drift: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub dry_run: bool,
    pub users_scanned: usize,
    pub drifts: Vec<DriftRow>,
    /// Correction entries written by this run.
    pub corrections: Vec<EntryId>,
}

impl ReconciliationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }
}

pub struct ReconciliationAuditor {
    engine: SettlementEngine,
}

impl ReconciliationAuditor {
    #[must_use]
    pub fn new(engine: SettlementEngine) -> Self {
        Self { engine }
    }

    /// Scan every account. With `dry_run` nothing is written.
    pub fn scan(&self, dry_run: bool) -> Result<ReconciliationReport> {
        let epsilon = self.engine.config().drift_epsilon;
        let (users_scanned, drifts) = self.engine.store().read(|state| {
            let mut users: Vec<UserId> = state.accounts.ids().collect();
            users.sort();
            let drifts: Vec<DriftRow> = users
                .iter()
                .filter_map(|&user_id| measure(state, user_id, epsilon))
                .collect();
            (users.len(), drifts)
        })?;

        let mut report = ReconciliationReport {
            dry_run,
            users_scanned,
            drifts,
            corrections: Vec::new(),
        };
        for row in &report.drifts {
            tracing::warn!(
                user = %row.user_id,
                stored = %row.stored,
                computed = %row.computed,
                drift = %row.drift,
                dry_run,
                "balance drift detected"
            );
        }
        if dry_run {
            return Ok(report);
        }

        // One unit per user so one failure does not block the rest.
        for row in &report.drifts {
            match self.correct(row.user_id, epsilon) {
                Ok(Some(entry_id)) => report.corrections.push(entry_id),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        user = %row.user_id,
                        error = %e,
                        "drift correction failed; will retry next scan"
                    );
                }
            }
        }
        tracing::info!(
            scanned = report.users_scanned,
            drifted = report.drifts.len(),
            corrected = report.corrections.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Re-measure inside a transaction and write the correction if the drift
    /// is still there and not already corrected.
    fn correct(&self, user_id: UserId, epsilon: Decimal) -> Result<Option<EntryId>> {
        let now = self.engine.now();
        let committed = self.engine.store().transaction(|tx| {
            let Some(row) = measure(tx, user_id, epsilon) else {
                return Ok(None);
            };
            let direction = Direction::of_delta(row.drift);
            let latest = tx.ledger.latest_for_user(user_id);
            let reference = ReferenceId::drift_event(user_id, latest, row.stored, row.computed);
            let kind = EntryKind::AdminAdjustment(direction);
            let key = IdempotencyKey::new(kind, reference, user_id);
            if !tx.check_and_reserve(key).is_allowed() {
                return Ok(None);
            }

            // Backdated to account creation so the ledger history reads in order.
            let anchor = tx.accounts.account(user_id)?.created_at;
            let id = tx.ledger.append(
                LedgerEntry::new(
                    user_id,
                    kind,
                    row.drift.abs(),
                    EntryStatus::Approved,
                    anchor,
                )
                .with_reference(reference)
                .with_tag(EntryTag::ReconciliationCorrection)
                .with_description(constants::RECONCILIATION_DESCRIPTION),
            )?;
            tx.record_admin_action(audit_record(
                None,
                AdminActionType::ReconciliationCorrection,
                user_id,
                format!(
                    "{direction} {} (stored {}, ledger {})",
                    row.drift.abs(),
                    row.stored,
                    row.computed
                ),
                now,
            ));
            Ok(Some(id))
        })?;
        let entry = self.engine.dispatch(committed);
        if let Some(id) = entry {
            tracing::info!(user = %user_id, entry = %id, "drift corrected");
        }
        Ok(entry)
    }
}

fn measure(state: &StoreState, user_id: UserId, epsilon: Decimal) -> Option<DriftRow> {
    let stored = state.accounts.get(user_id)?.balance;
    let computed = computed_balance(state.ledger.list_for_user(user_id));
    let drift = stored - computed;
    (drift.abs() > epsilon).then_some(DriftRow {
        user_id,
        stored,
        computed,
        drift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arenapay_ledger::WalletStore;
    use arenapay_types::{Actor, Role, WalletConfig};

    fn coins(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn engine() -> (SettlementEngine, Actor) {
        let engine =
            SettlementEngine::new(Arc::new(WalletStore::new()), WalletConfig::default()).unwrap();
        let admin = Actor::admin(UserId::new());
        engine.open_account(admin.id, Role::Admin).unwrap();
        (engine, admin)
    }

    fn drift_user(engine: &SettlementEngine, stored: Decimal) -> UserId {
        let user = UserId::new();
        engine.open_account(user, Role::Player).unwrap();
        engine
            .store()
            .transaction(|tx| tx.accounts.set_balance_unchecked(user, stored))
            .unwrap();
        user
    }

    #[test]
    fn clean_store_reports_nothing() {
        let (engine, admin) = engine();
        let user = UserId::new();
        engine.open_account(user, Role::Player).unwrap();
        engine
            .admin_adjust(&admin, user, Direction::Credit, coins(300), "seed")
            .unwrap();
        let report = ReconciliationAuditor::new(engine).scan(true).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.users_scanned, 2);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (engine, _) = engine();
        let user = drift_user(&engine, coins(500));
        let auditor = ReconciliationAuditor::new(engine.clone());
        let report = auditor.scan(true).unwrap();
        assert_eq!(report.drifts.len(), 1);
        assert!(report.corrections.is_empty());
        assert!(engine.ledger_for_user(user).unwrap().is_empty());
    }

    #[test]
    fn negative_drift_gets_debit_correction() {
        let (engine, admin) = engine();
        let user = UserId::new();
        engine.open_account(user, Role::Player).unwrap();
        engine
            .admin_adjust(&admin, user, Direction::Credit, coins(200), "seed")
            .unwrap();
        engine
            .store()
            .transaction(|tx| tx.accounts.set_balance_unchecked(user, coins(150)))
            .unwrap();

        let report = ReconciliationAuditor::new(engine.clone()).scan(false).unwrap();
        assert_eq!(report.corrections.len(), 1);
        let correction = engine.entry(report.corrections[0]).unwrap();
        assert_eq!(
            correction.kind,
            EntryKind::AdminAdjustment(Direction::Debit)
        );
        assert_eq!(correction.amount, coins(50));
        assert_eq!(engine.balance(user).unwrap(), coins(150));
    }

    #[test]
    fn drift_within_epsilon_is_ignored() {
        let (engine, _) = engine();
        drift_user(&engine, Decimal::new(1, 2));
        let report = ReconciliationAuditor::new(engine).scan(false).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn recurring_drift_with_same_numbers_is_corrected_again() {
        let (engine, admin) = engine();
        let user = UserId::new();
        engine.open_account(user, Role::Player).unwrap();
        engine
            .admin_adjust(&admin, user, Direction::Credit, coins(1000), "seed")
            .unwrap();
        let auditor = ReconciliationAuditor::new(engine.clone());
        let overwrite = |stored: i64| {
            let stored = coins(stored);
            engine
                .store()
                .transaction(|tx| tx.accounts.set_balance_unchecked(user, stored))
                .unwrap();
        };

        overwrite(1500);
        let first = auditor.scan(false).unwrap();
        assert_eq!(first.corrections.len(), 1);
        assert!(auditor.scan(true).unwrap().is_clean());

        // Spend 500, then the same out-of-band edit lands again.
        engine
            .admin_adjust(&admin, user, Direction::Debit, coins(500), "spend")
            .unwrap();
        overwrite(1500);
        let second = auditor.scan(false).unwrap();
        assert_eq!(second.drifts.len(), 1);
        assert_eq!(second.drifts[0].computed, coins(1000));
        assert_eq!(second.corrections.len(), 1);
        assert_ne!(second.corrections, first.corrections);

        let rescan = auditor.scan(false).unwrap();
        assert!(rescan.is_clean());
        assert!(rescan.corrections.is_empty());
        assert_eq!(engine.balance(user).unwrap(), coins(1500));
    }

    #[test]
    fn correct_is_a_no_op_once_closed() {
        let (engine, _) = engine();
        let user = drift_user(&engine, coins(300));
        let auditor = ReconciliationAuditor::new(engine.clone());
        let epsilon = engine.config().drift_epsilon;

        let written = auditor.correct(user, epsilon).unwrap();
        assert!(written.is_some());
        assert!(auditor.correct(user, epsilon).unwrap().is_none());
        assert_eq!(engine.ledger_for_user(user).unwrap().len(), 1);
    }
}
