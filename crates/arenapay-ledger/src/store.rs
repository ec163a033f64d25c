//! Transactional wallet store.
//!
//! Every settlement operation runs as one serializable unit of work,
//! mutating the shared state in place under the store lock:
//!
//! ```text
//! lock ─→ run closure in place ─┬─ Ok  ─→ clear journals  ─→ unlock ─→ dispatch effects
//!                               └─ Err ─→ replay journals ─→ unlock
//! ```
//!
//! Each store journals what it changes (appended entries, prior versions of
//! touched rows) so an aborted unit costs only what it touched. The balance
//! cache and the ledger can therefore never be observed out of step.
//! Notifications and admin-action records produced inside the unit are
//! handed back in [`Committed`] and only dispatched after the commit.

use std::collections::HashMap;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use arenapay_types::{
    AdminAction, ArenaError, Notification, Order, OrderId, Product, ProductId, Result, SpinItem,
    Tournament, TournamentId,
};

use crate::{BalanceStore, IdempotencyGuard, IdempotencyKey, LedgerStore, Reservation};

// ---------------------------------------------------------------------------
// StoreState
// ---------------------------------------------------------------------------

/// Everything the engine persists.
#[derive(Debug, Default)]
pub struct StoreState {
    pub accounts: BalanceStore,
    pub ledger: LedgerStore,
    tournaments: HashMap<TournamentId, Tournament>,
    orders: HashMap<OrderId, Order>,
    products: HashMap<ProductId, Product>,
    spin_items: Vec<SpinItem>,
    /// Append-only audit trail of admin and system actions.
    audit_log: Vec<AdminAction>,
    /// Audit records up to here are committed.
    audit_committed: usize,
    /// Prior values of catalog and tournament rows touched since the last
    /// commit.
    undo: Vec<Undo>,
}

#[derive(Debug)]
enum Undo {
    Tournament(TournamentId, Option<Tournament>),
    Order(OrderId, Option<Order>),
    Product(ProductId, Option<Product>),
    SpinItems(Vec<SpinItem>),
}

impl StoreState {
    pub fn tournament(&self, id: TournamentId) -> Result<&Tournament> {
        self.tournaments
            .get(&id)
            .ok_or(ArenaError::TournamentNotFound(id))
    }

    pub fn tournament_mut(&mut self, id: TournamentId) -> Result<&mut Tournament> {
        let tournament = self
            .tournaments
            .get_mut(&id)
            .ok_or(ArenaError::TournamentNotFound(id))?;
        self.undo.push(Undo::Tournament(id, Some(tournament.clone())));
        Ok(tournament)
    }

    pub fn tournaments(&self) -> impl Iterator<Item = &Tournament> {
        self.tournaments.values()
    }

    pub fn insert_tournament(&mut self, tournament: Tournament) {
        let id = tournament.id;
        let prior = self.tournaments.insert(id, tournament);
        self.undo.push(Undo::Tournament(id, prior));
    }

    pub fn order(&self, id: OrderId) -> Result<&Order> {
        self.orders.get(&id).ok_or(ArenaError::OrderNotFound(id))
    }

    pub fn order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(ArenaError::OrderNotFound(id))?;
        self.undo.push(Undo::Order(id, Some(order.clone())));
        Ok(order)
    }

    pub fn insert_order(&mut self, order: Order) {
        let id = order.id;
        let prior = self.orders.insert(id, order);
        self.undo.push(Undo::Order(id, prior));
    }

    pub fn product(&self, id: ProductId) -> Result<&Product> {
        self.products
            .get(&id)
            .ok_or(ArenaError::ProductNotFound(id))
    }

    pub fn insert_product(&mut self, product: Product) {
        let id = product.id;
        let prior = self.products.insert(id, product);
        self.undo.push(Undo::Product(id, prior));
    }

    #[must_use]
    pub fn spin_items(&self) -> &[SpinItem] {
        &self.spin_items
    }

    /// Active spin items in configured order.
    pub fn active_spin_items(&self) -> impl Iterator<Item = &SpinItem> {
        self.spin_items.iter().filter(|item| item.is_active)
    }

    pub fn replace_spin_items(&mut self, items: Vec<SpinItem>) {
        let prior = std::mem::replace(&mut self.spin_items, items);
        self.undo.push(Undo::SpinItems(prior));
    }

    #[must_use]
    pub fn audit_log(&self) -> &[AdminAction] {
        &self.audit_log
    }

    fn commit(&mut self) {
        self.accounts.commit();
        self.ledger.commit();
        self.undo.clear();
        self.audit_committed = self.audit_log.len();
    }

    /// Undo everything since the last commit.
    fn rollback(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Tournament(id, prior) => restore(&mut self.tournaments, id, prior),
                Undo::Order(id, prior) => restore(&mut self.orders, id, prior),
                Undo::Product(id, prior) => restore(&mut self.products, id, prior),
                Undo::SpinItems(prior) => self.spin_items = prior,
            }
        }
        self.audit_log.truncate(self.audit_committed);
        self.ledger.rollback();
        self.accounts.rollback();
    }
}

fn restore<K: Eq + Hash, V>(rows: &mut HashMap<K, V>, id: K, prior: Option<V>) {
    match prior {
        Some(row) => {
            rows.insert(id, row);
        }
        None => {
            rows.remove(&id);
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A unit of work over the locked state.
///
/// Derefs to [`StoreState`] so operations read and write stores directly;
/// every write goes through a journaling store method.
pub struct Transaction<'a> {
    state: &'a mut StoreState,
    guard: IdempotencyGuard,
    notifications: Vec<Notification>,
    admin_actions: Vec<AdminAction>,
}

impl<'a> Transaction<'a> {
    fn new(state: &'a mut StoreState) -> Self {
        Self {
            state,
            guard: IdempotencyGuard::new(),
            notifications: Vec::new(),
            admin_actions: Vec::new(),
        }
    }

    /// See [`IdempotencyGuard::check_and_reserve`].
    pub fn check_and_reserve(&mut self, key: IdempotencyKey) -> Reservation {
        let reservation = self.guard.check_and_reserve(&self.state.ledger, key);
        if !reservation.is_allowed() {
            tracing::debug!(
                key = %key,
                fingerprint = %key.fingerprint(),
                ?reservation,
                "idempotency hit"
            );
        }
        reservation
    }

    /// Queue a notification for delivery after commit.
    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Append to the audit trail and queue the record for the audit sink.
    pub fn record_admin_action(&mut self, action: AdminAction) {
        self.state.audit_log.push(action.clone());
        self.admin_actions.push(action);
    }

    fn into_effects(self) -> (Vec<Notification>, Vec<AdminAction>) {
        (self.notifications, self.admin_actions)
    }
}

impl Deref for Transaction<'_> {
    type Target = StoreState;

    fn deref(&self) -> &StoreState {
        self.state
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut StoreState {
        self.state
    }
}

/// Result of a committed transaction plus the effects it produced.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
    pub admin_actions: Vec<AdminAction>,
}

// ---------------------------------------------------------------------------
// WalletStore
// ---------------------------------------------------------------------------

/// Serializable in-memory store shared by every engine handle.
#[derive(Debug, Default)]
pub struct WalletStore {
    state: Mutex<StoreState>,
}

impl WalletStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing state. Whatever it holds counts as committed.
    #[must_use]
    pub fn with_state(mut state: StoreState) -> Self {
        state.commit();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Run `f` as one all-or-nothing unit.
    ///
    /// On `Err` everything the closure did is undone before the lock is
    /// released. On `Ok` all of it becomes visible at once.
    ///
    /// # Errors
    /// Whatever `f` returns, or `StoreUnavailable` if the store lock was
    /// poisoned by a panicking writer. The half-done unit is undone and the
    /// poison cleared, so a retry sees the last committed state.
    pub fn transaction<T, F>(&self, f: F) -> Result<Committed<T>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut state = self.lock()?;
        let mut tx = Transaction::new(&mut state);
        let outcome = f(&mut tx);
        let (notifications, admin_actions) = tx.into_effects();
        match outcome {
            Ok(value) => {
                state.commit();
                Ok(Committed {
                    value,
                    notifications,
                    admin_actions,
                })
            }
            Err(err) => {
                state.rollback();
                Err(err)
            }
        }
    }

    /// Consistent read of the committed state.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&StoreState) -> T,
    {
        let state = self.lock()?;
        Ok(f(&state))
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|poisoned| {
            // The panicking writer never reached commit: undo its journal.
            PoisonError::into_inner(poisoned).rollback();
            self.state.clear_poison();
            tracing::warn!("wallet store lock was poisoned; rolled back and cleared");
            ArenaError::StoreUnavailable("store lock poisoned".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arenapay_types::{
        EntryKind, EntryStatus, LedgerEntry, NewTournament, NotificationKind, OrderSource,
        OrderStatus, PrizeDistribution, Role, SpinPrize, UserAccount, UserId,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn store_with_user() -> (WalletStore, UserId) {
        let user = UserId::new();
        let mut state = StoreState::default();
        state
            .accounts
            .open(UserAccount::new(user, Role::Player, Utc::now()))
            .unwrap();
        (WalletStore::with_state(state), user)
    }

    fn deposit(tx: &mut Transaction<'_>, user: UserId, amount: i64) -> Result<()> {
        let amount = Decimal::new(amount, 0);
        tx.ledger.append(LedgerEntry::new(
            user,
            EntryKind::Deposit,
            amount,
            EntryStatus::Approved,
            Utc::now(),
        ))?;
        tx.accounts.credit(user, amount)?;
        Ok(())
    }

    #[test]
    fn commit_publishes_everything() {
        let (store, user) = store_with_user();
        let done = store
            .transaction(|tx| {
                deposit(tx, user, 100)?;
                tx.notify(Notification::new(user, NotificationKind::Wallet, "Deposit", "ok"));
                Ok(7)
            })
            .unwrap();
        assert_eq!(done.value, 7);
        assert_eq!(done.notifications.len(), 1);

        let (balance, entries) = store
            .read(|s| (s.accounts.balance(user).unwrap(), s.ledger.len()))
            .unwrap();
        assert_eq!(balance, Decimal::new(100, 0));
        assert_eq!(entries, 1);
    }

    #[test]
    fn error_rolls_back_ledger_and_balance() {
        let (store, user) = store_with_user();
        let err = store
            .transaction(|tx| {
                deposit(tx, user, 100)?;
                tx.accounts.try_debit(user, Decimal::new(500, 0))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ArenaError::InsufficientBalance { .. }));

        let (balance, entries) = store
            .read(|s| (s.accounts.balance(user).unwrap(), s.ledger.len()))
            .unwrap();
        assert_eq!(balance, Decimal::ZERO);
        assert_eq!(entries, 0);
    }

    #[test]
    fn poisoned_lock_is_transient_then_recovers() {
        let (store, user) = store_with_user();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.transaction(|tx| -> Result<()> {
                deposit(tx, user, 100)?;
                panic!("writer crashed");
            });
        }));
        assert!(outcome.is_err());

        let err = store.read(|_| ()).unwrap_err();
        assert!(err.is_transient());

        // Retry sees the last committed state.
        let (balance, entries) = store
            .read(|s| (s.accounts.balance(user).unwrap(), s.ledger.len()))
            .unwrap();
        assert_eq!(balance, Decimal::ZERO);
        assert_eq!(entries, 0);
        store.transaction(|tx| deposit(tx, user, 40)).unwrap();
        let balance = store.read(|s| s.accounts.balance(user).unwrap()).unwrap();
        assert_eq!(balance, Decimal::new(40, 0));
    }

    #[test]
    fn audit_log_commits_with_the_unit() {
        let (store, _) = store_with_user();
        let _ = store.transaction(|tx| -> Result<()> {
            tx.record_admin_action(AdminAction {
                admin_id: None,
                action: arenapay_types::AdminActionType::GrantSpins,
                target_id: "x".into(),
                details: String::new(),
                recorded_at: Utc::now(),
            });
            Err(ArenaError::Internal("abort".into()))
        });
        assert_eq!(store.read(|s| s.audit_log().len()).unwrap(), 0);
    }

    #[test]
    fn error_restores_rows_touched_in_place() {
        let (store, user) = store_with_user();
        let committed = store
            .transaction(|tx| {
                deposit(tx, user, 100)?;
                let tournament = Tournament::open(
                    NewTournament {
                        title: "Cup".to_string(),
                        entry_fee: Decimal::TEN,
                        prizes: PrizeDistribution::default(),
                        max_slots: 8,
                        start_time: Utc::now(),
                    },
                    Utc::now(),
                )?;
                let order = Order::pending(
                    user,
                    None,
                    "Skin",
                    Decimal::ONE,
                    OrderSource::Spin,
                    Utc::now(),
                );
                let ids = (tournament.id, order.id);
                tx.insert_tournament(tournament);
                tx.insert_order(order);
                tx.replace_spin_items(vec![SpinItem::new("Coins", 1.0, SpinPrize::Nothing)]);
                Ok(ids)
            })
            .unwrap();
        let (tournament_id, order_id) = committed.value;

        let err = store
            .transaction(|tx| -> Result<()> {
                deposit(tx, user, 50)?;
                tx.tournament_mut(tournament_id)?.joined_count = 5;
                tx.order_mut(order_id)?
                    .resolve(OrderStatus::Approved, None, Utc::now())?;
                let product = Product::new("Gem Pack", Decimal::TEN);
                tx.insert_product(product);
                tx.replace_spin_items(Vec::new());
                tx.ledger
                    .amend_pending_amount(arenapay_types::EntryId::new(), Decimal::ONE)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ArenaError::EntryNotFound(_)));

        store
            .read(|s| {
                assert_eq!(s.accounts.balance(user).unwrap(), Decimal::new(100, 0));
                assert_eq!(s.ledger.len(), 1);
                assert_eq!(s.tournament(tournament_id).unwrap().joined_count, 0);
                assert_eq!(s.order(order_id).unwrap().status, OrderStatus::Pending);
                assert_eq!(s.tournaments().count(), 1);
                assert_eq!(s.spin_items().len(), 1);
            })
            .unwrap();
    }

    #[test]
    fn error_removes_rows_created_in_the_unit() {
        let (store, user) = store_with_user();
        let newcomer = UserId::new();
        let product = Product::new("Gem Pack", Decimal::TEN);
        let product_id = product.id;
        let _ = store.transaction(|tx| -> Result<()> {
            tx.accounts
                .open(UserAccount::new(newcomer, Role::Player, Utc::now()))?;
            tx.insert_product(product);
            deposit(tx, user, 10)?;
            Err(ArenaError::Internal("abort".into()))
        });

        store
            .read(|s| {
                assert!(s.accounts.get(newcomer).is_none());
                assert!(s.product(product_id).is_err());
                assert!(s.ledger.is_empty());
                assert!(s.ledger.latest_for_user(user).is_none());
            })
            .unwrap();
    }
}
