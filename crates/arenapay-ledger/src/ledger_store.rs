//! Ledger store: the append-only record of monetary events.
//!
//! Entries are appended, looked up, and moved out of `Pending` exactly once.
//! There is no update or delete; a wrong entry is compensated by a new one.
//!
//! Every mutation is journaled until the owning transaction commits, so an
//! aborted unit can be undone in place.

use std::collections::HashMap;

use arenapay_types::{
    ArenaError, EntryId, EntryKind, EntryStatus, LedgerEntry, ReferenceId, Result, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Append-only ledger with per-user and per-id indexes.
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    /// Entries in append order.
    entries: Vec<LedgerEntry>,
    /// `EntryId → position in entries`.
    index: HashMap<EntryId, usize>,
    /// `UserId → positions in entries`, append order.
    by_user: HashMap<UserId, Vec<usize>>,
    /// Mutations since the last commit, oldest first.
    undo: Vec<Undo>,
}

#[derive(Debug, Clone)]
enum Undo {
    /// Pop the newest entry.
    Append,
    /// Put back the entry as it was before a transition or amendment.
    Restore(usize, LedgerEntry),
}

impl LedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns its id.
    ///
    /// # Errors
    /// - `InvalidAmount` if the amount is not strictly positive
    /// - `DuplicateEntry` if the id is already present
    pub fn append(&mut self, entry: LedgerEntry) -> Result<EntryId> {
        if entry.amount <= Decimal::ZERO {
            return Err(ArenaError::InvalidAmount(entry.amount));
        }
        if self.index.contains_key(&entry.id) {
            return Err(ArenaError::DuplicateEntry(entry.id));
        }
        let id = entry.id;
        let pos = self.entries.len();
        self.by_user.entry(entry.user_id).or_default().push(pos);
        self.index.insert(id, pos);
        self.entries.push(entry);
        self.undo.push(Undo::Append);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<&LedgerEntry> {
        self.index.get(&id).map(|&pos| &self.entries[pos])
    }

    pub fn entry(&self, id: EntryId) -> Result<&LedgerEntry> {
        self.get(id).ok_or(ArenaError::EntryNotFound(id))
    }

    /// The settled or in-flight entry for `(user, kind, reference)`, if any.
    ///
    /// Rejected, failed and cancelled entries are ignored: they had no effect
    /// and must not block a legitimate retry.
    #[must_use]
    pub fn find(
        &self,
        user_id: UserId,
        kind: EntryKind,
        reference: ReferenceId,
    ) -> Option<&LedgerEntry> {
        self.user_entries(user_id)
            .find(|e| e.kind == kind && e.reference == Some(reference) && e.is_live())
    }

    /// All entries of a user, oldest first. Ties keep append order.
    #[must_use]
    pub fn list_for_user(&self, user_id: UserId) -> Vec<&LedgerEntry> {
        let mut entries: Vec<&LedgerEntry> = self.user_entries(user_id).collect();
        // Stable sort: backdated entries slot in by time, ties stay in append order.
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// One-shot status transition.
    ///
    /// # Errors
    /// - `EntryNotFound` for unknown ids
    /// - `AlreadyProcessed` if the entry already left `Pending`
    pub fn transition(
        &mut self,
        id: EntryId,
        target: EntryStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&LedgerEntry> {
        let pos = *self.index.get(&id).ok_or(ArenaError::EntryNotFound(id))?;
        let prior = self.entries[pos].clone();
        self.entries[pos].transition(target, reason, at)?;
        self.undo.push(Undo::Restore(pos, prior));
        Ok(&self.entries[pos])
    }

    /// Correct the amount of an entry that is still pending (an admin
    /// adjusting a deposit before approving it).
    pub fn amend_pending_amount(&mut self, id: EntryId, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(ArenaError::InvalidAmount(amount));
        }
        let pos = *self.index.get(&id).ok_or(ArenaError::EntryNotFound(id))?;
        let entry = &mut self.entries[pos];
        if entry.status != EntryStatus::Pending {
            return Err(ArenaError::AlreadyProcessed {
                entry: id,
                status: entry.status,
            });
        }
        let prior = entry.clone();
        entry.amount = amount;
        self.undo.push(Undo::Restore(pos, prior));
        Ok(())
    }

    /// Pending reviewable entries (deposits, withdrawals) created before
    /// `cutoff`, oldest first.
    #[must_use]
    pub fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Vec<EntryId> {
        let mut stuck: Vec<&LedgerEntry> = self
            .entries
            .iter()
            .filter(|e| {
                e.status == EntryStatus::Pending && e.kind.is_reviewable() && e.created_at < cutoff
            })
            .collect();
        stuck.sort_by_key(|e| e.created_at);
        stuck.into_iter().map(|e| e.id).collect()
    }

    /// Sum of a user's pending or settled withdrawals created in `[from, to)`.
    #[must_use]
    pub fn withdrawals_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Decimal {
        self.user_entries(user_id)
            .filter(|e| {
                e.kind == EntryKind::Withdrawal
                    && e.is_live()
                    && e.created_at >= from
                    && e.created_at < to
            })
            .map(|e| e.amount)
            .sum()
    }

    /// The entry most recently appended for a user, whatever its
    /// `created_at` says.
    #[must_use]
    pub fn latest_for_user(&self, user_id: UserId) -> Option<EntryId> {
        let &pos = self.by_user.get(&user_id)?.last()?;
        Some(self.entries[pos].id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn user_entries(&self, user_id: UserId) -> impl Iterator<Item = &LedgerEntry> {
        self.by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .map(|&pos| &self.entries[pos])
    }

    /// Forget the journal: everything so far is permanent.
    pub(crate) fn commit(&mut self) {
        self.undo.clear();
    }

    /// Undo every mutation since the last commit, newest first.
    pub(crate) fn rollback(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Append => {
                    let Some(entry) = self.entries.pop() else {
                        continue;
                    };
                    self.index.remove(&entry.id);
                    if let Some(positions) = self.by_user.get_mut(&entry.user_id) {
                        positions.pop();
                        if positions.is_empty() {
                            self.by_user.remove(&entry.user_id);
                        }
                    }
                }
                Undo::Restore(pos, prior) => self.entries[pos] = prior,
            }
        }
    }
}
