//! # arenapay-ledger
//!
//! **Persistence layer**: the append-only ledger, the per-user balance
//! cache, the settlement idempotency guard, and the transactional store
//! that keeps them consistent.
//!
//! ## Architecture
//!
//! 1. **LedgerStore**: append-only entries with one-shot status transitions
//! 2. **BalanceStore**: accounts and their running balances, conditional debits
//! 3. **IdempotencyGuard**: at most one effect per `(kind, reference, user)`
//! 4. **WalletStore**: serializable all-or-nothing units over all of the above
//!
//! ## Write Flow
//!
//! ```text
//! engine op → WalletStore.transaction(|tx| {
//!     tx.check_and_reserve(key)?  → tx.accounts.try_debit()  → tx.ledger.append()
//! }) → Committed { value, notifications, admin_actions } → sinks
//! ```
//!
//! A balance change is never committed without the ledger entry that
//! justifies it.

pub mod balance_store;
pub mod idempotency;
pub mod ledger_store;
pub mod store;

pub use balance_store::BalanceStore;
pub use idempotency::{IdempotencyGuard, IdempotencyKey, Reservation};
pub use ledger_store::LedgerStore;
pub use store::{Committed, StoreState, Transaction, WalletStore};
