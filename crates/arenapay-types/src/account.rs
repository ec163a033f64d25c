//! User accounts and the caller identity used for authorization.
//!
//! `balance` is a denormalized cache of the ledger. Only the settlement
//! engine mutates it, and only inside the transaction that appends the
//! ledger entry justifying the change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ArenaError, Result, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Admin,
}

/// The authenticated caller of an operation, as reported by the session
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    #[must_use]
    pub fn player(id: UserId) -> Self {
        Self {
            id,
            role: Role::Player,
        }
    }

    #[must_use]
    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// # Errors
    /// Returns [`ArenaError::AdminRequired`] for non-admin callers.
    pub fn require_admin(&self, action: &'static str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ArenaError::AdminRequired { action })
        }
    }
}

/// A wallet-holding account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    pub id: UserId,
    pub role: Role,
    /// Running balance. Always equal to the ledger-derived balance.
    pub balance: Decimal,
    pub spins_available: u32,
    /// Rejected-as-fraudulent deposit count.
    pub fraud_strikes: u8,
    pub banned: bool,
    /// Display counter, refreshed with every prize entry.
    pub total_wins: u32,
    /// Display counter, refreshed with every prize entry. The ledger is the
    /// source of truth for winnings.
    pub total_earnings: Decimal,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    #[must_use]
    pub fn new(id: UserId, role: Role, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            role,
            balance: Decimal::ZERO,
            spins_available: 0,
            fraud_strikes: 0,
            banned: false,
            total_wins: 0,
            total_earnings: Decimal::ZERO,
            created_at,
        }
    }

    /// # Errors
    /// Returns [`ArenaError::AccountBanned`] for banned accounts.
    pub fn ensure_active(&self) -> Result<()> {
        if self.banned {
            Err(ArenaError::AccountBanned(self.id))
        } else {
            Ok(())
        }
    }
}
