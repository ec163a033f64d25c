//! # arenapay-settlement
//!
//! **Settlement plane**: the engine that applies every balance-moving
//! business operation, plus the batch and time-driven processes around it.
//!
//! ## Architecture
//!
//! 1. **SettlementEngine**: join, cancel/refund, finalize/payout, deposits,
//!    withdrawals, admin adjustments, store purchases, orders and spins
//! 2. **ReconciliationAuditor**: recomputes balances from the ledger and
//!    closes drift with tagged correction entries
//! 3. **SchedulerHooks**: tournament auto-start and stuck-entry timeout,
//!    driven by an external trigger or the in-process [`SchedulerRunner`]
//! 4. **SettingsStore**: platform settings and the maintenance gate
//!
//! ## Request Flow
//!
//! ```text
//! caller → SettlementEngine.op() → WalletStore.transaction(..) → Committed
//!        → NotificationSink / AuditSink (best effort)
//! ```
//!
//! Idempotency hits are successes: retried operations report
//! [`Settlement::AlreadyApplied`] instead of failing.

pub mod auditor;
pub mod engine;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod spin;
pub mod telemetry;

pub use auditor::{DriftRow, ReconciliationAuditor, ReconciliationReport};
pub use engine::{
    CancelOutcome, DepositRejection, FinalizeOutcome, OrderRejection, Settlement, SettlementEngine,
    SpinResult, TracingSink,
};
pub use scheduler::{SchedulerHooks, SchedulerRunner, TickReport};
pub use settings::{MaintenanceGate, PlatformSettings, SettingsStore};
