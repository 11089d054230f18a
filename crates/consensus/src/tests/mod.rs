//! Protocol tests over the in-process peer transport

mod replication_test;

use crate::{
    clock::Clock,
    events::{EventKind, MemorySink},
    peer::LocalPeer,
    replica::{Replica, ReplicaBuilder},
};
use std::{sync::Arc, time::Duration};

/// Fully connected replicas, each with its own recording sink
pub(crate) struct Cluster {
    pub replicas: Vec<Arc<Replica>>,
    pub sinks: Vec<Arc<MemorySink>>,
    /// `links[i]` are replica i's peer links, in ascending peer id order
    pub links: Vec<Vec<Arc<LocalPeer>>>,
}

impl Cluster {
    /// `size` replicas with accounts 1..=20 funded at 1000, ready for clients
    pub fn new(size: u32) -> Self {
        let cluster = Self::unready(size);
        for replica in &cluster.replicas {
            replica.mark_ready();
        }
        cluster
    }

    pub fn unready(size: u32) -> Self {
        let mut replicas = Vec::new();
        let mut sinks = Vec::new();
        for id in 0..size {
            let sink = Arc::new(MemorySink::new());
            let replica = ReplicaBuilder::new(id)
                .initial_accounts(20, 1000)
                .halt_grace(Duration::from_millis(10))
                .events(sink.clone())
                .build()
                .unwrap();
            replicas.push(Arc::new(replica));
            sinks.push(sink);
        }

        let mut links = Vec::new();
        for (i, replica) in replicas.iter().enumerate() {
            let mut own = Vec::new();
            for (j, peer) in replicas.iter().enumerate() {
                if i == j {
                    continue;
                }
                let link = Arc::new(LocalPeer::new(peer.clone()));
                replica.add_peer(link.clone());
                own.push(link);
            }
            links.push(own);
        }

        Self {
            replicas,
            sinks,
            links,
        }
    }

    /// Clocks in the order replica `i` applied them
    pub fn executed(&self, i: usize) -> Vec<Clock> {
        self.sinks[i]
            .of_kind(EventKind::Execute)
            .into_iter()
            .filter_map(|e| e.clock)
            .collect()
    }

    pub fn total(&self, i: usize) -> i64 {
        self.replicas[i].balances().values().sum()
    }
}
