//! Globally unique identifiers used throughout ArenaPay.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting,
//! except drift-event references which are derived deterministically.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Unique identifier for a player or admin account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntryId
// ---------------------------------------------------------------------------

/// Identifier of a single ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TournamentId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TournamentId(pub Uuid);

impl TournamentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TournamentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TournamentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tournament:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OrderId / ProductId / SpinItemId
// ---------------------------------------------------------------------------

/// Identifier of a store or spin-prize fulfillment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ProductId(pub Uuid);

impl ProductId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SpinItemId(pub Uuid);

impl SpinItemId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SpinItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpinItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spin-item:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ReferenceId
// ---------------------------------------------------------------------------

/// The business object a ledger entry settles (tournament, order, season...).
///
/// Together with the entry kind and the user it forms the idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ReferenceId(pub Uuid);

impl ReferenceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Deterministic reference for one observed drift event.
    ///
    /// An observation is the user's stored and computed balances together
    /// with the last entry appended to their ledger when they were measured.
    /// Two auditor runs racing on the same observation collide on the
    /// idempotency key. Any later ledger activity yields a fresh reference,
    /// so a recurring drift with the same numbers is corrected again.
    #[must_use]
    pub fn drift_event(
        user_id: UserId,
        latest_entry: Option<EntryId>,
        stored: Decimal,
        computed: Decimal,
    ) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"arenapay:drift:v2:");
        hasher.update(user_id.0.as_bytes());
        if let Some(entry) = latest_entry {
            hasher.update(entry.0.as_bytes());
        }
        hasher.update(b"|");
        hasher.update(stored.normalize().to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(computed.normalize().to_string().as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }

    /// Short hex form for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl Default for ReferenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}", self.0)
    }
}

impl From<TournamentId> for ReferenceId {
    fn from(id: TournamentId) -> Self {
        Self(id.0)
    }
}

impl From<OrderId> for ReferenceId {
    fn from(id: OrderId) -> Self {
        Self(id.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_uniqueness_and_ordering() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn tournament_reference_shares_uuid() {
        let t = TournamentId::new();
        let r: ReferenceId = t.into();
        assert_eq!(r.0, t.0);
    }

    fn coins(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn drift_event_is_deterministic() {
        let user = UserId::new();
        let latest = Some(EntryId::new());
        let a = ReferenceId::drift_event(user, latest, coins(1500), coins(1000));
        let b = ReferenceId::drift_event(user, latest, coins(1500), coins(1000));
        assert_eq!(a, b);
    }

    #[test]
    fn drift_event_ignores_scale() {
        let user = UserId::new();
        let a = ReferenceId::drift_event(user, None, coins(1500), coins(1000));
        let b = ReferenceId::drift_event(user, None, Decimal::new(150_000, 2), coins(1000));
        assert_eq!(a, b);
    }

    #[test]
    fn drift_event_differs_by_observation() {
        let user = UserId::new();
        let a = ReferenceId::drift_event(user, None, coins(1500), coins(1000));
        let b = ReferenceId::drift_event(user, None, coins(1600), coins(1000));
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn drift_event_changes_with_later_ledger_activity() {
        let user = UserId::new();
        let before = ReferenceId::drift_event(user, Some(EntryId::new()), coins(1500), coins(1000));
        let after = ReferenceId::drift_event(user, Some(EntryId::new()), coins(1500), coins(1000));
        assert_ne!(before, after);
    }

    #[test]
    fn serde_roundtrip() {
        let id = EntryId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
