//! Balance store: the per-user running balance.
//!
//! Every mutation is conditional and atomic at the call level: either the
//! full operation succeeds or the account is unchanged. The store never
//! writes ledger entries itself; callers pair each mutation with the ledger
//! append that justifies it inside one [`crate::Transaction`].
//!
//! Each touched account is snapshotted into an undo journal before it is
//! changed; the transaction either clears the journal or replays it.

use std::collections::HashMap;

use arenapay_types::{ArenaError, Result, UserAccount, UserId};
use rust_decimal::Decimal;

/// Accounts with their denormalized balances.
#[derive(Debug, Clone, Default)]
pub struct BalanceStore {
    accounts: HashMap<UserId, UserAccount>,
    /// Prior versions of touched accounts since the last commit. `None`
    /// marks an account opened in the current unit.
    undo: Vec<(UserId, Option<UserAccount>)>,
}

impl BalanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new account.
    ///
    /// # Errors
    /// Returns `UserAlreadyExists` if the id is taken.
    pub fn open(&mut self, account: UserAccount) -> Result<()> {
        if self.accounts.contains_key(&account.id) {
            return Err(ArenaError::UserAlreadyExists(account.id));
        }
        self.undo.push((account.id, None));
        self.accounts.insert(account.id, account);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<&UserAccount> {
        self.accounts.get(&user_id)
    }

    pub fn account(&self, user_id: UserId) -> Result<&UserAccount> {
        self.accounts
            .get(&user_id)
            .ok_or(ArenaError::UserNotFound(user_id))
    }

    pub fn account_mut(&mut self, user_id: UserId) -> Result<&mut UserAccount> {
        let account = self
            .accounts
            .get_mut(&user_id)
            .ok_or(ArenaError::UserNotFound(user_id))?;
        self.undo.push((user_id, Some(account.clone())));
        Ok(account)
    }

    pub fn balance(&self, user_id: UserId) -> Result<Decimal> {
        Ok(self.account(user_id)?.balance)
    }

    /// Add `amount` to the balance. Returns the new balance.
    ///
    /// # Errors
    /// Returns `InvalidAmount` if `amount <= 0`.
    pub fn credit(&mut self, user_id: UserId, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(ArenaError::InvalidAmount(amount));
        }
        let account = self.account_mut(user_id)?;
        account.balance += amount;
        Ok(account.balance)
    }

    /// Decrement only if `balance >= amount`. Returns the new balance.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount <= 0`
    /// - `InsufficientBalance` if balance < amount (balance unchanged)
    pub fn try_debit(&mut self, user_id: UserId, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(ArenaError::InvalidAmount(amount));
        }
        let account = self.account_mut(user_id)?;
        if account.balance < amount {
            return Err(ArenaError::InsufficientBalance {
                needed: amount,
                available: account.balance,
            });
        }
        account.balance -= amount;
        Ok(account.balance)
    }

    /// Refresh the display counters after a prize entry.
    pub fn record_win(&mut self, user_id: UserId, prize: Decimal) -> Result<()> {
        let account = self.account_mut(user_id)?;
        account.total_wins = account.total_wins.saturating_add(1);
        account.total_earnings += prize;
        Ok(())
    }

    /// Use one spin. Returns the spins left.
    ///
    /// # Errors
    /// Returns `NoSpinsAvailable` when the counter is zero.
    pub fn consume_spin(&mut self, user_id: UserId) -> Result<u32> {
        let account = self.account_mut(user_id)?;
        if account.spins_available == 0 {
            return Err(ArenaError::NoSpinsAvailable);
        }
        account.spins_available -= 1;
        Ok(account.spins_available)
    }

    pub fn grant_spins(&mut self, user_id: UserId, count: u32) -> Result<u32> {
        let account = self.account_mut(user_id)?;
        account.spins_available = account.spins_available.saturating_add(count);
        Ok(account.spins_available)
    }

    /// Count a fraud strike, banning the account at `ban_threshold`.
    /// Returns `true` if this strike banned the account.
    pub fn add_fraud_strike(&mut self, user_id: UserId, ban_threshold: u8) -> Result<bool> {
        let account = self.account_mut(user_id)?;
        account.fraud_strikes = account.fraud_strikes.saturating_add(1);
        if !account.banned && account.fraud_strikes >= ban_threshold {
            account.banned = true;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.accounts.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances.
    #[must_use]
    pub fn total_balance(&self) -> Decimal {
        self.accounts.values().map(|a| a.balance).sum()
    }

    pub(crate) fn commit(&mut self) {
        self.undo.clear();
    }

    /// Restore every touched account, newest change first.
    pub(crate) fn rollback(&mut self) {
        while let Some((user_id, prior)) = self.undo.pop() {
            match prior {
                Some(account) => {
                    self.accounts.insert(user_id, account);
                }
                None => {
                    self.accounts.remove(&user_id);
                }
            }
        }
    }

    /// Overwrite a balance without a ledger entry, the way an out-of-band
    /// database edit would. **Test use only.**
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn set_balance_unchecked(&mut self, user_id: UserId, balance: Decimal) -> Result<()> {
        self.account_mut(user_id)?.balance = balance;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arenapay_types::Role;
    use chrono::Utc;

    fn store_with(balance: i64) -> (BalanceStore, UserId) {
        let mut bs = BalanceStore::new();
        let user = UserId::new();
        bs.open(UserAccount::new(user, Role::Player, Utc::now()))
            .unwrap();
        if balance > 0 {
            bs.credit(user, Decimal::new(balance, 0)).unwrap();
        }
        (bs, user)
    }

    #[test]
    fn credit_increases_balance() {
        let (mut bs, user) = store_with(0);
        assert_eq!(
            bs.credit(user, Decimal::new(1000, 0)).unwrap(),
            Decimal::new(1000, 0)
        );
        assert_eq!(bs.balance(user).unwrap(), Decimal::new(1000, 0));
    }

    #[test]
    fn debit_is_conditional() {
        let (mut bs, user) = store_with(1000);
        bs.try_debit(user, Decimal::new(600, 0)).unwrap();
        let err = bs.try_debit(user, Decimal::new(600, 0)).unwrap_err();
        assert!(matches!(err, ArenaError::InsufficientBalance { .. }));
        // Balance unchanged by the failed debit
        assert_eq!(bs.balance(user).unwrap(), Decimal::new(400, 0));
    }

    #[test]
    fn zero_and_negative_amounts_rejected() {
        let (mut bs, user) = store_with(100);
        assert!(matches!(
            bs.credit(user, Decimal::ZERO),
            Err(ArenaError::InvalidAmount(_))
        ));
        assert!(matches!(
            bs.try_debit(user, Decimal::new(-5, 0)),
            Err(ArenaError::InvalidAmount(_))
        ));
        assert_eq!(bs.balance(user).unwrap(), Decimal::new(100, 0));
    }

    #[test]
    fn duplicate_open_rejected() {
        let (mut bs, user) = store_with(0);
        let err = bs
            .open(UserAccount::new(user, Role::Player, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, ArenaError::UserAlreadyExists(_)));
    }

    #[test]
    fn unknown_user_errors() {
        let mut bs = BalanceStore::new();
        assert!(matches!(
            bs.credit(UserId::new(), Decimal::ONE),
            Err(ArenaError::UserNotFound(_))
        ));
    }

    #[test]
    fn spins_consume_down_to_zero() {
        let (mut bs, user) = store_with(0);
        bs.grant_spins(user, 2).unwrap();
        assert_eq!(bs.consume_spin(user).unwrap(), 1);
        assert_eq!(bs.consume_spin(user).unwrap(), 0);
        assert!(matches!(bs.consume_spin(user), Err(ArenaError::NoSpinsAvailable)));
    }

    #[test]
    fn third_fraud_strike_bans() {
        let (mut bs, user) = store_with(0);
        assert!(!bs.add_fraud_strike(user, 3).unwrap());
        assert!(!bs.add_fraud_strike(user, 3).unwrap());
        assert!(bs.add_fraud_strike(user, 3).unwrap());
        assert!(bs.account(user).unwrap().banned);
        // Further strikes do not report a fresh ban.
        assert!(!bs.add_fraud_strike(user, 3).unwrap());
    }

    #[test]
    fn total_balance_sums_all_users() {
        let (mut bs, u1) = store_with(1000);
        let u2 = UserId::new();
        bs.open(UserAccount::new(u2, Role::Player, Utc::now()))
            .unwrap();
        bs.credit(u2, Decimal::new(500, 0)).unwrap();
        bs.try_debit(u1, Decimal::new(300, 0)).unwrap();
        assert_eq!(bs.total_balance(), Decimal::new(1200, 0));
    }

    #[test]
    fn rollback_restores_touched_accounts() {
        let (mut bs, user) = store_with(1000);
        bs.commit();

        bs.try_debit(user, Decimal::new(250, 0)).unwrap();
        bs.grant_spins(user, 3).unwrap();
        bs.add_fraud_strike(user, 1).unwrap();
        let newcomer = UserId::new();
        bs.open(UserAccount::new(newcomer, Role::Player, Utc::now()))
            .unwrap();
        bs.credit(newcomer, Decimal::TEN).unwrap();
        bs.rollback();

        let account = bs.account(user).unwrap();
        assert_eq!(account.balance, Decimal::new(1000, 0));
        assert_eq!(account.spins_available, 0);
        assert!(!account.banned);
        assert!(bs.get(newcomer).is_none());
        assert_eq!(bs.len(), 1);
    }
}
