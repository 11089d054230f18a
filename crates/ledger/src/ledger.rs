//! In-memory account ledger
//!
//! The ledger itself is not synchronized. The replica that owns it keeps it behind
//! the same lock as its order queue, so dequeue and apply happen as one step.

use crate::{
    account::{Account, AccountId, Amount},
    error::LedgerError,
};
use std::collections::BTreeMap;

/// Account balances held by one replica
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    /// Accounts keyed by id, iterated in ascending id order
    accounts: BTreeMap<AccountId, Account>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            accounts: BTreeMap::new(),
        }
    }

    /// Create accounts `1..=count`, each funded with `balance`
    pub fn with_funded_accounts(count: u32, balance: Amount) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for uid in 1..=count {
            ledger.create_account(uid);
            ledger.deposit(uid, balance)?;
        }
        Ok(ledger)
    }

    /// Insert an account with a zero balance.
    ///
    /// Re-creating an existing id overwrites it, so its balance goes back to 0.
    pub fn create_account(&mut self, uid: AccountId) -> AccountId {
        if self.accounts.insert(uid, Account::new(uid)).is_some() {
            tracing::debug!("Account {} re-created, balance reset", uid);
        }
        uid
    }

    /// Current balance of an account
    pub fn balance(&self, uid: AccountId) -> Result<Amount, LedgerError> {
        self.accounts
            .get(&uid)
            .map(|a| a.balance)
            .ok_or(LedgerError::NotFound(uid))
    }

    /// Add `amount` to an account. Always succeeds when the account exists.
    pub fn deposit(&mut self, uid: AccountId, amount: Amount) -> Result<bool, LedgerError> {
        let account = self
            .accounts
            .get_mut(&uid)
            .ok_or(LedgerError::NotFound(uid))?;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(uid))?;
        Ok(true)
    }

    /// Move `amount` from one account to another.
    ///
    /// Returns `Ok(false)` without touching either balance when `from` holds less
    /// than `amount`.
    pub fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<bool, LedgerError> {
        let from_balance = self.balance(from)?;
        let to_balance = self.balance(to)?;

        if from_balance < amount {
            return Ok(false);
        }

        if from == to {
            return Ok(true);
        }

        let debited = from_balance
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow(from))?;
        let credited = to_balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(to))?;

        // Both checked above, nothing can fail past this point
        if let Some(a) = self.accounts.get_mut(&from) {
            a.balance = debited;
        }
        if let Some(a) = self.accounts.get_mut(&to) {
            a.balance = credited;
        }

        Ok(true)
    }

    /// Check if an account exists
    pub fn contains(&self, uid: AccountId) -> bool {
        self.accounts.contains_key(&uid)
    }

    /// All balances in ascending id order
    pub fn balances(&self) -> BTreeMap<AccountId, Amount> {
        self.accounts
            .values()
            .map(|a| (a.id, a.balance))
            .collect()
    }

    /// Sum of every balance
    pub fn total(&self) -> Amount {
        self.accounts.values().map(|a| a.balance).sum()
    }

    /// Get account count
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Check if the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> Ledger {
        Ledger::with_funded_accounts(20, 1000).unwrap()
    }

    #[test]
    fn test_funded_accounts() {
        let ledger = funded();
        assert_eq!(ledger.len(), 20);
        assert_eq!(ledger.balance(1).unwrap(), 1000);
        assert_eq!(ledger.balance(20).unwrap(), 1000);
        assert_eq!(ledger.total(), 20_000);
        assert!(!ledger.contains(21));
    }

    #[test]
    fn test_get_balance_unknown_account() {
        let ledger = funded();
        assert_eq!(ledger.balance(99), Err(LedgerError::NotFound(99)));
    }

    #[test]
    fn test_recreate_resets_balance() {
        let mut ledger = funded();
        assert_eq!(ledger.create_account(3), 3);
        assert_eq!(ledger.balance(3).unwrap(), 0);
        assert_eq!(ledger.len(), 20);
    }

    #[test]
    fn test_deposit() {
        let mut ledger = funded();
        assert!(ledger.deposit(1, 250).unwrap());
        assert_eq!(ledger.balance(1).unwrap(), 1250);

        // Negative amounts are applied as given
        assert!(ledger.deposit(1, -2000).unwrap());
        assert_eq!(ledger.balance(1).unwrap(), -750);

        assert_eq!(ledger.deposit(42, 10), Err(LedgerError::NotFound(42)));
    }

    #[test]
    fn test_deposit_overflow() {
        let mut ledger = funded();
        assert_eq!(
            ledger.deposit(2, Amount::MAX),
            Err(LedgerError::Overflow(2))
        );
        assert_eq!(ledger.balance(2).unwrap(), 1000);
    }

    #[test]
    fn test_transfer() {
        let mut ledger = funded();
        assert!(ledger.transfer(1, 2, 100).unwrap());
        assert_eq!(ledger.balance(1).unwrap(), 900);
        assert_eq!(ledger.balance(2).unwrap(), 1100);
        assert_eq!(ledger.total(), 20_000);
    }

    #[test]
    fn test_transfer_insufficient_funds() {
        let mut ledger = funded();
        assert!(!ledger.transfer(1, 2, 1001).unwrap());
        assert_eq!(ledger.balance(1).unwrap(), 1000);
        assert_eq!(ledger.balance(2).unwrap(), 1000);
    }

    #[test]
    fn test_transfer_unknown_account() {
        let mut ledger = funded();
        assert_eq!(ledger.transfer(1, 77, 5), Err(LedgerError::NotFound(77)));
        assert_eq!(ledger.transfer(77, 1, 5), Err(LedgerError::NotFound(77)));
        assert_eq!(ledger.balance(1).unwrap(), 1000);
    }

    #[test]
    fn test_transfer_to_self() {
        let mut ledger = funded();
        assert!(ledger.transfer(4, 4, 500).unwrap());
        assert_eq!(ledger.balance(4).unwrap(), 1000);
    }
}
