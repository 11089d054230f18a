//! Client-visible behaviour of the replicated ledger

use super::Cluster;
use crate::{
    errors::ReplicaError,
    events::EventKind,
    types::{Operation, Outcome, Request},
};
use bank_ledger::LedgerError;
use std::time::Duration;

#[tokio::test]
async fn test_transfer_replicates_to_peer() {
    let cluster = Cluster::new(2);

    let res = cluster.replicas[0]
        .client_request(Request::transfer(1, 2, 100, "client"))
        .await
        .unwrap();

    assert_eq!(res.success(), Some(true));
    assert_eq!(res.clock().map(|c| c.replica), Some(0));
    for replica in &cluster.replicas {
        assert_eq!(replica.balance(1).unwrap(), 900);
        assert_eq!(replica.balance(2).unwrap(), 1100);
        assert!(replica.pending().is_empty());
    }
}

#[tokio::test]
async fn test_deposit_through_second_replica() {
    let cluster = Cluster::new(3);

    let res = cluster.replicas[2]
        .client_request(Request::deposit(7, 250, "client"))
        .await
        .unwrap();

    assert_eq!(res.success(), Some(true));
    for i in 0..3 {
        assert_eq!(cluster.replicas[i].balance(7).unwrap(), 1250);
        assert_eq!(cluster.total(i), 20_250);
    }
}

#[tokio::test]
async fn test_insufficient_funds_changes_nothing() {
    let cluster = Cluster::new(2);

    let res = cluster.replicas[1]
        .client_request(Request::transfer(1, 2, 5000, "client"))
        .await
        .unwrap();

    assert_eq!(res.success(), Some(false));
    assert_eq!(res.outcome(), &Outcome::Transfer { success: false });
    for replica in &cluster.replicas {
        assert_eq!(replica.balance(1).unwrap(), 1000);
        assert_eq!(replica.balance(2).unwrap(), 1000);
    }
}

#[tokio::test]
async fn test_unknown_account_balance_fails_everywhere() {
    let cluster = Cluster::new(3);

    for replica in &cluster.replicas {
        let err = replica
            .client_request(Request::get_balance(99, "client"))
            .await
            .unwrap_err();
        assert_eq!(err, ReplicaError::Ledger(LedgerError::NotFound(99)));
    }
}

#[tokio::test]
async fn test_transfer_to_unknown_account_is_dequeued() {
    let cluster = Cluster::new(2);

    let err = cluster.replicas[0]
        .client_request(Request::transfer(1, 404, 10, "client"))
        .await
        .unwrap_err();

    assert_eq!(err, ReplicaError::Ledger(LedgerError::NotFound(404)));
    for replica in &cluster.replicas {
        assert!(replica.pending().is_empty());
        assert_eq!(replica.balance(1).unwrap(), 1000);
    }

    // The failed request does not block later ones
    let res = cluster.replicas[1]
        .client_request(Request::transfer(3, 4, 10, "client"))
        .await
        .unwrap();
    assert_eq!(res.success(), Some(true));
}

#[tokio::test]
async fn test_recreating_account_resets_balance() {
    let cluster = Cluster::new(2);

    let res = cluster.replicas[1]
        .client_request(Request::create_account(3, "client"))
        .await
        .unwrap();

    assert_eq!(res.uid(), Some(3));
    for replica in &cluster.replicas {
        assert_eq!(replica.balance(3).unwrap(), 0);
    }

    let res = cluster.replicas[0]
        .client_request(Request::create_account(21, "client"))
        .await
        .unwrap();
    assert_eq!(res.uid(), Some(21));
    assert_eq!(cluster.replicas[1].balance(21).unwrap(), 0);
}

#[tokio::test]
async fn test_get_balance_is_local_only() {
    let cluster = Cluster::new(2);

    let res = cluster.replicas[0]
        .client_request(Request::get_balance(5, "client"))
        .await
        .unwrap();

    assert_eq!(res.balance(), Some(1000));
    assert!(res.clock().is_some());
    assert!(cluster.sinks[1].of_kind(EventKind::ProposeReceived).is_empty());
    assert!(cluster.sinks[0].of_kind(EventKind::Execute).is_empty());
    assert!(cluster.replicas[0].pending().is_empty());
}

#[tokio::test]
async fn test_unknown_kind_is_a_no_op() {
    let cluster = Cluster::new(2);

    let res = cluster.replicas[0]
        .client_request(Request::new(Operation::Unknown, "client"))
        .await
        .unwrap();

    assert_eq!(res.outcome(), &Outcome::Empty);
    assert!(res.clock().is_some());
    for (i, replica) in cluster.replicas.iter().enumerate() {
        assert!(replica.pending().is_empty());
        assert_eq!(cluster.total(i), 20_000);
    }
}

#[tokio::test]
async fn test_malformed_kind_is_a_no_op() {
    let cluster = Cluster::new(2);
    let request: Request = serde_json::from_value(serde_json::json!({
        "op": { "kind": "transfer", "from": 1 },
        "origin": "client",
    }))
    .unwrap();

    let res = cluster.replicas[1].client_request(request).await.unwrap();

    assert_eq!(res.outcome(), &Outcome::Empty);
    assert_eq!(res.clock().map(|c| c.replica), Some(1));
    assert_eq!(cluster.sinks[0].of_kind(EventKind::ProposeReceived).len(), 1);
    for (i, replica) in cluster.replicas.iter().enumerate() {
        assert!(replica.pending().is_empty());
        assert_eq!(cluster.total(i), 20_000);
    }
}

#[tokio::test]
async fn test_not_ready_rejects_clients() {
    let cluster = Cluster::unready(2);

    let err = cluster.replicas[0]
        .client_request(Request::deposit(1, 1, "client"))
        .await
        .unwrap_err();
    assert_eq!(err, ReplicaError::NotReady(0));

    // Peers can still propose to a replica that is bootstrapping
    let ack = cluster.replicas[1]
        .propose_request(Request::deposit(1, 1, "Replica-0").stamped(crate::Clock::new(1, 0)))
        .await
        .unwrap();
    assert!(ack.is_ack());
}

#[tokio::test]
async fn test_unreachable_peer_fails_request() {
    let cluster = Cluster::new(2);
    cluster.links[0][0].disconnect();

    let err = cluster.replicas[0]
        .client_request(Request::deposit(1, 10, "client"))
        .await
        .unwrap_err();

    assert!(err.is_delivery_failure());
    // No rollback: the request stays queued at the originator, the peer never saw it
    assert_eq!(cluster.replicas[0].pending().len(), 1);
    assert!(cluster.replicas[1].pending().is_empty());
    assert_eq!(cluster.replicas[0].balance(1).unwrap(), 1000);
    assert_eq!(cluster.replicas[1].balance(1).unwrap(), 1000);
}

#[tokio::test]
async fn test_halt_reports_and_shuts_down_every_replica() {
    let cluster = Cluster::new(2);

    cluster.replicas[0]
        .client_request(Request::transfer(1, 2, 100, "client"))
        .await
        .unwrap();
    let res = cluster.replicas[0]
        .client_request(Request::halt("client"))
        .await
        .unwrap();

    let report = res.halt_report().expect("halt report");
    assert_eq!(report.replica, 0);
    assert_eq!(report.total, 20_000);
    assert_eq!(report.balances.len(), 20);
    assert_eq!(report.balances[&1], 900);
    assert!(report.pending.is_empty());
    assert!(report.avg_request_secs.is_some());

    for (i, replica) in cluster.replicas.iter().enumerate() {
        tokio::time::timeout(Duration::from_secs(5), replica.shutdown_signal().wait())
            .await
            .expect("shutdown signalled");
        assert_eq!(cluster.sinks[i].of_kind(EventKind::Balance).len(), 20);
        assert_eq!(cluster.sinks[i].of_kind(EventKind::Total).len(), 1);
        assert_eq!(cluster.sinks[i].of_kind(EventKind::Exit).len(), 1);
    }
}

#[tokio::test]
async fn test_halt_lists_pending_requests() {
    let cluster = Cluster::new(2);

    // A larger-clock proposal that was never committed is still queued at halt
    cluster.replicas[1]
        .propose_request(Request::deposit(2, 5, "Replica-1").stamped(crate::Clock::new(50, 1)))
        .await
        .unwrap();

    let res = cluster.replicas[0]
        .client_request(Request::halt("client"))
        .await
        .unwrap();

    assert!(res.halt_report().unwrap().pending.is_empty());

    let queued = cluster.sinks[1].of_kind(EventKind::QueueEntry);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].clock, Some(crate::Clock::new(50, 1)));
    assert_eq!(cluster.replicas[1].pending().len(), 1);
}
