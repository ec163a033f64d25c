//! # Ledger entries: the append-only monetary record
//!
//! A [`LedgerEntry`] records one monetary event for one user. The ledger is
//! the durable source of truth; `UserAccount::balance` is a cache of it.
//!
//! ## Status machine
//!
//! ```text
//!   ┌─────────┐  approve   ┌──────────┐
//!   │ PENDING ├───────────▶│ APPROVED │   (settled)
//!   └────┬────┘            └──────────┘
//!        │ reject / timeout / cancel
//!        ▼
//!   ┌──────────────────────────────┐
//!   │ REJECTED | FAILED | CANCELLED │  (zero effect)
//!   └──────────────────────────────┘
//! ```
//!
//! Transitions are one-shot: only a `Pending` entry can move, and it moves
//! exactly once. Entries are never deleted; mistakes are compensated by new
//! entries.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ArenaError, EntryId, ReferenceId, Result, UserId};

/// Which way an entry moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// +1 for credits, -1 for debits.
    #[must_use]
    pub fn sign(self) -> Decimal {
        match self {
            Self::Credit => Decimal::ONE,
            Self::Debit => Decimal::NEGATIVE_ONE,
        }
    }

    /// Direction that moves a balance by `delta` (positive → credit).
    #[must_use]
    pub fn of_delta(delta: Decimal) -> Self {
        if delta.is_sign_negative() {
            Self::Debit
        } else {
            Self::Credit
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credit => write!(f, "CREDIT"),
            Self::Debit => write!(f, "DEBIT"),
        }
    }
}

/// The business operation an entry records.
///
/// `amount` on an entry is always a positive magnitude; the sign comes from
/// [`EntryKind::direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    EntryFee,
    PrizeWinnings,
    Refund,
    ShopPurchase,
    SpinWin,
    AdminAdjustment(Direction),
    RankReward,
}

impl EntryKind {
    /// Sign-and-classify rule used by every balance computation.
    #[must_use]
    pub fn direction(self) -> Direction {
        match self {
            Self::Deposit
            | Self::PrizeWinnings
            | Self::Refund
            | Self::SpinWin
            | Self::RankReward => Direction::Credit,
            Self::Withdrawal | Self::EntryFee | Self::ShopPurchase => Direction::Debit,
            Self::AdminAdjustment(direction) => direction,
        }
    }

    /// Kinds whose funds leave the balance when the entry is created, before
    /// the entry is approved.
    #[must_use]
    pub fn is_pre_deducted(self) -> bool {
        matches!(self, Self::Withdrawal)
    }

    /// Kinds that wait for an admin decision and may time out.
    #[must_use]
    pub fn is_reviewable(self) -> bool {
        matches!(self, Self::Deposit | Self::Withdrawal)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::EntryFee => "entry_fee",
            Self::PrizeWinnings => "prize_winnings",
            Self::Refund => "refund",
            Self::ShopPurchase => "shop_purchase",
            Self::SpinWin => "spin_win",
            Self::AdminAdjustment(Direction::Credit) => "admin_adjustment_credit",
            Self::AdminAdjustment(Direction::Debit) => "admin_adjustment_debit",
            Self::RankReward => "rank_reward",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ledger entry.
///
/// Serialized as `snake_case`; deserialized through [`EntryStatus::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum EntryStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
    Failed,
    Cancelled,
}

impl EntryStatus {
    /// Parse a status string regardless of casing or surrounding whitespace.
    ///
    /// This is the only place raw status strings are classified; `"Rejected"`,
    /// `"REJECTED"` and `"rejected"` are the same status.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(ArenaError::InvalidStatus(raw.to_string())),
        }
    }

    /// Settled entries count toward the balance.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Approved | Self::Completed)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only `Pending` may move, and only forward.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self == Self::Pending && target != Self::Pending
    }
}

impl TryFrom<String> for EntryStatus {
    type Error = ArenaError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Marker attached to system-generated entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTag {
    /// Written by the reconciliation auditor to absorb detected drift.
    ReconciliationCorrection,
}

impl fmt::Display for EntryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReconciliationCorrection => f.write_str(crate::constants::RECONCILIATION_TAG),
        }
    }
}

/// One monetary event for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    /// Positive magnitude. Direction is derived from `kind`.
    pub amount: Decimal,
    pub kind: EntryKind,
    pub status: EntryStatus,
    /// The business object this entry settles, if any.
    pub reference: Option<ReferenceId>,
    pub description: String,
    pub tag: Option<EntryTag>,
    pub created_at: DateTime<Utc>,
    /// When the one-shot status transition happened.
    pub processed_at: Option<DateTime<Utc>>,
    /// Why the entry was rejected / failed, when it was.
    pub status_reason: Option<String>,
}

impl LedgerEntry {
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: EntryKind,
        amount: Decimal,
        status: EntryStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            user_id,
            amount,
            kind,
            status,
            reference: None,
            description: String::new(),
            tag: None,
            created_at,
            processed_at: if status.is_terminal() {
                Some(created_at)
            } else {
                None
            },
            status_reason: None,
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<ReferenceId>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: EntryTag) -> Self {
        self.tag = Some(tag);
        self
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }

    /// Settled, or pending and therefore still able to settle.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status.is_settled() || self.status == EntryStatus::Pending
    }

    /// Contribution of this entry to the user's balance.
    ///
    /// Settled entries add or subtract their amount. A pending entry whose
    /// funds were deducted up front (a withdrawal request) counts as a hold.
    /// Everything else contributes zero.
    #[must_use]
    pub fn balance_effect(&self) -> Decimal {
        if self.status.is_settled() {
            return self.amount * self.direction().sign();
        }
        if self.status == EntryStatus::Pending && self.kind.is_pre_deducted() {
            return -self.amount;
        }
        Decimal::ZERO
    }

    /// One-shot status transition.
    ///
    /// # Errors
    /// - [`ArenaError::AlreadyProcessed`] if the entry already left `Pending`
    /// - [`ArenaError::InvalidEntryTransition`] if `target` is `Pending`
    pub fn transition(
        &mut self,
        target: EntryStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ArenaError::AlreadyProcessed {
                entry: self.id,
                status: self.status,
            });
        }
        if !self.status.can_transition_to(target) {
            return Err(ArenaError::InvalidEntryTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.status_reason = reason;
        self.processed_at = Some(at);
        Ok(())
    }
}

/// Sum of [`LedgerEntry::balance_effect`] over a sequence of entries.
pub fn computed_balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Decimal {
    entries.into_iter().map(LedgerEntry::balance_effect).sum()
}
