//! Error types for the ArenaPay settlement engine.
//!
//! All errors use the `AP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Account / authorization errors
//! - 2xx: Balance errors
//! - 3xx: Ledger errors
//! - 4xx: Tournament errors
//! - 5xx: Store, order and spin errors
//! - 6xx: Settlement admission errors
//! - 8xx: Security errors
//! - 9xx: General / internal errors
//!
//! Idempotency hits are not errors and never appear here.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    EntryId, EntryKind, EntryStatus, OrderId, ProductId, TournamentId, TournamentStatus, UserId,
};

/// Central error enum for all ArenaPay operations.
#[derive(Debug, Error)]
pub enum ArenaError {
    // =================================================================
    // Account / Authorization Errors (1xx)
    // =================================================================
    #[error("AP_ERR_100: User not found: {0}")]
    UserNotFound(UserId),

    #[error("AP_ERR_101: User already exists: {0}")]
    UserAlreadyExists(UserId),

    /// The account is banned and may not move funds.
    #[error("AP_ERR_102: Account is banned: {0}")]
    AccountBanned(UserId),

    /// An admin-only operation was attempted by a regular user.
    #[error("AP_ERR_103: Admin role required for {action}")]
    AdminRequired { action: &'static str },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    #[error("AP_ERR_200: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Amount was zero, negative, or otherwise unusable.
    #[error("AP_ERR_201: Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("AP_ERR_202: Withdrawal {requested} below minimum {minimum}")]
    BelowMinimumWithdrawal {
        requested: Decimal,
        minimum: Decimal,
    },

    #[error("AP_ERR_203: Daily limit exceeded: used {used} + requested {requested} > {limit}")]
    DailyLimitExceeded {
        used: Decimal,
        requested: Decimal,
        limit: Decimal,
    },

    // =================================================================
    // Ledger Errors (3xx)
    // =================================================================
    #[error("AP_ERR_300: Ledger entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The entry already left `Pending`; status transitions are one-shot.
    #[error("AP_ERR_301: Entry {entry} already processed (status {status})")]
    AlreadyProcessed { entry: EntryId, status: EntryStatus },

    #[error("AP_ERR_302: Invalid entry transition {from} -> {to}")]
    InvalidEntryTransition { from: EntryStatus, to: EntryStatus },

    #[error("AP_ERR_303: Entry kind mismatch: expected {expected}, got {actual}")]
    EntryKindMismatch {
        expected: EntryKind,
        actual: EntryKind,
    },

    #[error("AP_ERR_304: Unrecognised entry status: {0:?}")]
    InvalidStatus(String),

    #[error("AP_ERR_305: Duplicate entry id: {0}")]
    DuplicateEntry(EntryId),

    // =================================================================
    // Tournament Errors (4xx)
    // =================================================================
    #[error("AP_ERR_400: Tournament not found: {0}")]
    TournamentNotFound(TournamentId),

    #[error("AP_ERR_401: Invalid tournament transition {from} -> {to}")]
    InvalidTournamentTransition {
        from: TournamentStatus,
        to: TournamentStatus,
    },

    #[error("AP_ERR_402: Tournament is {0}, not open for registration")]
    TournamentNotOpen(TournamentStatus),

    #[error("AP_ERR_403: Tournament is full ({max_slots} slots)")]
    TournamentFull { max_slots: u32 },

    #[error("AP_ERR_404: User already joined this tournament")]
    AlreadyJoined,

    #[error("AP_ERR_405: Game UID {0:?} is already registered in this tournament")]
    GameUidTaken(String),

    #[error("AP_ERR_406: Invalid winners: {reason}")]
    InvalidWinners { reason: String },

    #[error("AP_ERR_407: Invalid tournament: {reason}")]
    InvalidTournament { reason: String },

    // =================================================================
    // Store / Order / Spin Errors (5xx)
    // =================================================================
    #[error("AP_ERR_500: Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("AP_ERR_501: Product is not active: {0}")]
    ProductInactive(ProductId),

    #[error("AP_ERR_502: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("AP_ERR_503: Order {order} already resolved as {status}")]
    OrderAlreadyResolved { order: OrderId, status: String },

    #[error("AP_ERR_504: No spins available")]
    NoSpinsAvailable,

    #[error("AP_ERR_505: No active spin items configured")]
    NoSpinItems,

    #[error("AP_ERR_506: Invalid spin item: {reason}")]
    InvalidSpinItem { reason: String },

    // =================================================================
    // Settlement Admission Errors (6xx)
    // =================================================================
    /// The platform is in maintenance mode and not admitting new operations.
    #[error("AP_ERR_600: Platform is in maintenance mode")]
    MaintenanceMode,

    // =================================================================
    // Security Errors (8xx)
    // =================================================================
    #[error("AP_ERR_800: Scheduler trigger rejected: invalid shared secret")]
    InvalidSchedulerSecret,

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("AP_ERR_900: Internal error: {0}")]
    Internal(String),

    /// The store could not run the transaction (lock poisoned, aborted).
    /// Safe to retry.
    #[error("AP_ERR_901: Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("AP_ERR_902: Configuration error: {0}")]
    Configuration(String),

    #[error("AP_ERR_903: Serialization error: {0}")]
    Serialization(String),

    #[error("AP_ERR_904: I/O error: {0}")]
    Io(String),
}

impl ArenaError {
    /// Transient failures may be retried by the caller; everything else is
    /// a precondition violation that will fail the same way again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ArenaError>;

impl From<std::io::Error> for ArenaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ArenaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
