//! Peer link - how one replica invokes operations on another
//!
//! The coordinator only sees `PeerService`, so the transport can be swapped: the
//! in-process `LocalPeer` here for tests, JSON-RPC over HTTP in `bank-rpc`.

use crate::{
    clock::ReplicaId,
    errors::ReplicaError,
    replica::Replica,
    types::{Request, Response},
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Operations a replica exposes to its peers
#[async_trait]
pub trait PeerService: Send + Sync {
    /// Label used in logs and errors, e.g. an address
    fn label(&self) -> String;

    /// Id of the remote replica
    async fn identity(&self) -> Result<ReplicaId, ReplicaError>;

    /// Queue a stamped request on the peer; answered with an `Ack`
    async fn propose(&self, request: &Request) -> Result<Response, ReplicaError>;

    /// Dequeue and apply a stamped request on the peer
    async fn execute(&self, request: &Request) -> Result<Response, ReplicaError>;
}

/// In-process peer calling straight into another `Replica`
pub struct LocalPeer {
    replica: Arc<Replica>,
    reachable: AtomicBool,
}

impl LocalPeer {
    pub fn new(replica: Arc<Replica>) -> Self {
        Self {
            replica,
            reachable: AtomicBool::new(true),
        }
    }

    /// Make every later call fail as undeliverable
    pub fn disconnect(&self) {
        self.reachable.store(false, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), ReplicaError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ReplicaError::unreachable(self.label(), "link down"))
        }
    }
}

#[async_trait]
impl PeerService for LocalPeer {
    fn label(&self) -> String {
        format!("Replica-{}", self.replica.id())
    }

    async fn identity(&self) -> Result<ReplicaId, ReplicaError> {
        self.check_reachable()?;
        Ok(self.replica.id())
    }

    async fn propose(&self, request: &Request) -> Result<Response, ReplicaError> {
        self.check_reachable()?;
        self.replica.propose_request(request.clone()).await
    }

    async fn execute(&self, request: &Request) -> Result<Response, ReplicaError> {
        self.check_reachable()?;
        self.replica.execute_request(request.clone()).await
    }
}
