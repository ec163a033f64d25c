//! Fulfillment orders for store purchases and spin prizes.
//!
//! An order starts `Pending` and is resolved exactly once, as `Approved`
//! (delivered) or `Rejected` (refunded).

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ArenaError, OrderId, ProductId, Result, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
}

impl OrderStatus {
    /// Parse a status string regardless of casing or surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ArenaError::InvalidStatus(raw.to_string())),
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = ArenaError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Where an order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    /// Bought with coins in the store.
    Shop,
    /// Won on the lucky spin; nothing was paid.
    Spin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: Option<ProductId>,
    /// Name snapshot so history survives catalog edits.
    pub item_name: String,
    /// Coins debited for this order. Zero for spin prizes.
    pub price_paid: Decimal,
    pub status: OrderStatus,
    pub source: OrderSource,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
}

impl Order {
    #[must_use]
    pub fn pending(
        user_id: UserId,
        product_id: Option<ProductId>,
        item_name: impl Into<String>,
        price_paid: Decimal,
        source: OrderSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            product_id,
            item_name: item_name.into(),
            price_paid,
            status: OrderStatus::Pending,
            source,
            created_at: now,
            resolved_at: None,
            resolution_note: None,
        }
    }

    /// Resolve a pending order.
    ///
    /// # Errors
    /// Returns [`ArenaError::OrderAlreadyResolved`] if the order is terminal
    /// or `target` is `Pending`.
    pub fn resolve(
        &mut self,
        target: OrderStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() || !target.is_terminal() {
            return Err(ArenaError::OrderAlreadyResolved {
                order: self.id,
                status: self.status.to_string(),
            });
        }
        self.status = target;
        self.resolution_note = note;
        self.resolved_at = Some(at);
        Ok(())
    }
}
