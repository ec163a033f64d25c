//! Settlement idempotency guard: one effect per business key.
//!
//! A prize, refund, rank reward or reconciliation correction is identified
//! by `(kind, reference, user)`. The ledger itself is the durable record of
//! which keys have settled; the guard adds the keys reserved by the current
//! transaction so a batch cannot settle the same key twice before commit.
//!
//! A duplicate is not an error. Callers receive [`Reservation::Duplicate`]
//! with the id of the entry that already carries the effect and report
//! success without mutating anything.

use std::collections::HashSet;
use std::fmt;

use arenapay_types::{EntryId, EntryKind, ReferenceId, UserId};
use sha2::{Digest, Sha256};

use crate::LedgerStore;

/// Business key of an effect that must happen at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub kind: EntryKind,
    pub reference: ReferenceId,
    pub user_id: UserId,
}

impl IdempotencyKey {
    #[must_use]
    pub fn new(kind: EntryKind, reference: impl Into<ReferenceId>, user_id: UserId) -> Self {
        Self {
            kind,
            reference: reference.into(),
            user_id,
        }
    }

    /// Short stable digest for log correlation.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(self.reference.0.as_bytes());
        hasher.update(self.user_id.0.as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.reference, self.user_id)
    }
}

/// Outcome of [`IdempotencyGuard::check_and_reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The key is free and now reserved for this transaction.
    Allowed,
    /// The effect already exists in the ledger.
    Duplicate(EntryId),
    /// The key was already reserved earlier in this same transaction.
    ReservedInTransaction,
}

impl Reservation {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Per-transaction reservation set.
#[derive(Debug, Default)]
pub struct IdempotencyGuard {
    reserved: HashSet<IdempotencyKey>,
}

impl IdempotencyGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the key against the ledger and this transaction's reservations,
    /// reserving it if free.
    pub fn check_and_reserve(&mut self, ledger: &LedgerStore, key: IdempotencyKey) -> Reservation {
        if let Some(existing) = ledger.find(key.user_id, key.kind, key.reference) {
            return Reservation::Duplicate(existing.id);
        }
        if !self.reserved.insert(key) {
            return Reservation::ReservedInTransaction;
        }
        Reservation::Allowed
    }

    #[must_use]
    pub fn is_reserved(&self, key: &IdempotencyKey) -> bool {
        self.reserved.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }
}
