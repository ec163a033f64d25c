//! Side-effect records emitted by settlements, and the sinks that consume
//! them.
//!
//! Notifications are best-effort: they are dispatched after the settlement
//! commits, and a failing sink never rolls anything back. Admin actions are
//! written to the store inside the settlement's transaction and then
//! forwarded to the audit sink the same way.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Wallet,
    Tournament,
    Order,
    Spin,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

impl Notification {
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminActionType {
    ApproveDeposit,
    RejectDeposit,
    BanUser,
    ApproveWithdrawal,
    RejectWithdrawal,
    AdjustBalance,
    CreateTournament,
    CancelTournament,
    FinalizeTournament,
    AwardPrize,
    RankReward,
    ApproveOrder,
    RejectOrder,
    GrantSpins,
    UpsertProduct,
    SetSpinItems,
    ReconciliationCorrection,
}

impl fmt::Display for AdminActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ApproveDeposit => "APPROVE_DEPOSIT",
            Self::RejectDeposit => "REJECT_DEPOSIT",
            Self::BanUser => "BAN_USER",
            Self::ApproveWithdrawal => "APPROVE_WITHDRAWAL",
            Self::RejectWithdrawal => "REJECT_WITHDRAWAL",
            Self::AdjustBalance => "ADJUST_BALANCE",
            Self::CreateTournament => "CREATE_TOURNAMENT",
            Self::CancelTournament => "CANCEL_TOURNAMENT",
            Self::FinalizeTournament => "FINALIZE_TOURNAMENT",
            Self::AwardPrize => "AWARD_PRIZE",
            Self::RankReward => "RANK_REWARD",
            Self::ApproveOrder => "APPROVE_ORDER",
            Self::RejectOrder => "REJECT_ORDER",
            Self::GrantSpins => "GRANT_SPINS",
            Self::UpsertProduct => "UPSERT_PRODUCT",
            Self::SetSpinItems => "SET_SPIN_ITEMS",
            Self::ReconciliationCorrection => "RECONCILIATION_CORRECTION",
        };
        f.write_str(s)
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAction {
    /// `None` for actions taken by the system itself (auditor, scheduler).
    pub admin_id: Option<UserId>,
    pub action: AdminActionType,
    pub target_id: String,
    pub details: String,
    pub recorded_at: DateTime<Utc>,
}

/// Receives user notifications. Fire-and-forget.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Receives admin-action audit records. Informational only.
pub trait AuditSink: Send + Sync {
    fn record_admin_action(&self, action: &AdminAction) -> Result<()>;
}

/// In-memory sink that records everything it receives. **Test use only.**
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    notifications: std::sync::Mutex<Vec<Notification>>,
    actions: std::sync::Mutex<Vec<AdminAction>>,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }

    pub fn actions(&self) -> Vec<AdminAction> {
        self.actions.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::ArenaError::Io("sink offline".to_string()));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.check()?;
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl AuditSink for RecordingSink {
    fn record_admin_action(&self, action: &AdminAction) -> Result<()> {
        self.check()?;
        self.actions.lock().unwrap().push(action.clone());
        Ok(())
    }
}
