//! Ledger Errors

use crate::account::AccountId;
use thiserror::Error;

/// Ledger operation errors
///
/// An insufficient balance on transfer is not an error; it is reported as an
/// unsuccessful transfer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("Balance overflow on account {0}")]
    Overflow(AccountId),
}
