//! Bank Ledger - per-replica account state
//!
//! Every replica owns one `Ledger`. It is deterministic and only changes through
//! the operations defined here, so replicas that apply the same operations in the
//! same order end up with identical balances.

pub mod account;
pub mod error;
pub mod ledger;

pub use account::{Account, AccountId, Amount};
pub use error::LedgerError;
pub use ledger::Ledger;

/// Number of accounts every replica creates at startup
pub const DEFAULT_INITIAL_ACCOUNTS: u32 = 20;

/// Balance each startup account is funded with
pub const DEFAULT_INITIAL_BALANCE: Amount = 1000;
