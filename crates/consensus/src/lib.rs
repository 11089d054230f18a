//! Bank Consensus - total-order replication of ledger operations
//!
//! Architecture:
//! - Every replica stamps client requests with a `(counter, replica)` logical clock
//! - The stamped request is proposed to every peer, which queues it
//! - The originator waits until the request is the head of its own queue
//! - It then commits the request on every peer and applies it locally
//!
//! All replicas apply the same "smallest clock first" rule, so they agree on the
//! order in which mutating requests hit their ledgers.

pub mod clock;
pub mod errors;
pub mod events;
pub mod peer;
pub mod queue;
pub mod replica;
pub mod shutdown;
pub mod types;

#[cfg(test)]
mod tests;

pub use clock::{Clock, LogicalClock, ReplicaId};
pub use errors::ReplicaError;
pub use events::{Event, EventKind, EventSink, JsonLinesSink, MemorySink, Sinks, TracingSink};
pub use peer::{LocalPeer, PeerService};
pub use queue::OrderQueue;
pub use replica::{Replica, ReplicaBuilder, ReplicaConfig};
pub use shutdown::ShutdownSignal;
pub use types::*;
