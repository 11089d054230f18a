//! Account record

use serde::{Deserialize, Serialize};

/// Caller-assigned account identifier
pub type AccountId = u32;

/// Balances and amounts. Signed: deposits are not validated.
pub type Amount = i64;

/// A single account in a replica's ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Amount,
}

impl Account {
    /// Open an account with a zero balance
    pub fn new(id: AccountId) -> Self {
        Self { id, balance: 0 }
    }
}
