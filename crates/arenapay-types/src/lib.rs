//! # arenapay-types
//!
//! Shared types, errors, and configuration for the **ArenaPay** wallet and
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`UserId`], [`EntryId`], [`TournamentId`], [`OrderId`],
//!   [`ProductId`], [`SpinItemId`], [`ReferenceId`]
//! - **Ledger model**: [`LedgerEntry`], [`EntryKind`], [`EntryStatus`], [`Direction`], [`EntryTag`]
//! - **Accounts**: [`UserAccount`], [`Actor`], [`Role`]
//! - **Tournaments**: [`Tournament`], [`TournamentStatus`], [`Participant`], [`Winner`],
//!   [`PrizeDistribution`]
//! - **Store**: [`Order`], [`OrderStatus`], [`OrderSource`], [`Product`], [`SpinItem`],
//!   [`SpinPrize`]
//! - **Side effects**: [`Notification`], [`AdminAction`], [`NotificationSink`], [`AuditSink`]
//! - **Time**: [`Clock`], [`SystemClock`]
//! - **Configuration**: [`WalletConfig`], [`SchedulerConfig`]
//! - **Errors**: [`ArenaError`] with `AP_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod account;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod constants;
pub mod effects;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod order;
pub mod tournament;

// Re-export all primary types at crate root for ergonomic imports:
//   use arenapay_types::{LedgerEntry, EntryKind, Tournament, ...};

pub use account::*;
pub use catalog::*;
pub use clock::*;
pub use config::*;
pub use effects::*;
pub use error::*;
pub use ids::*;
pub use ledger::*;
pub use order::*;
pub use tournament::*;

// Constants are accessed via `arenapay_types::constants::FOO`
// (not re-exported to avoid name collisions).
