//! Replica Errors

use crate::clock::ReplicaId;
use bank_ledger::LedgerError;
use thiserror::Error;

/// Errors surfaced to the caller of a replica operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A propose or commit could not be delivered. Nothing is retried or rolled back.
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Replica {0} has not finished connecting to its peers")]
    NotReady(ReplicaId),
}

impl ReplicaError {
    pub fn unreachable(peer: impl Into<String>, reason: impl ToString) -> Self {
        ReplicaError::PeerUnreachable {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    /// Transport failure, as opposed to an error raised by the peer's ledger
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, ReplicaError::PeerUnreachable { .. })
    }
}
