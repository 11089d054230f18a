//! Replica coordinator - runs the ordering protocol for one replica
//!
//! A client-originated request moves through four steps:
//! 1. Assigned: stamped with the next local clock and queued locally
//! 2. Proposed: sent to every peer, which queues it and acknowledges once its own
//!    smaller-clock requests have been proposed everywhere
//! 3. Ordered: the coordinator waits until the request heads its own queue
//! 4. Committed: every peer, then this replica, dequeues and applies it
//!
//! The ledger and the order queue sit behind one mutex. Waiting never holds it:
//! the waiter samples the queue head under the lock, releases it, and sleeps until
//! the queue changes, so proposals and commits from peers can always get in.

use crate::{
    clock::{Clock, LogicalClock, ReplicaId},
    errors::ReplicaError,
    events::{Event, EventKind, EventSink, TracingSink},
    peer::PeerService,
    queue::OrderQueue,
    shutdown::ShutdownSignal,
    types::{HaltReport, Operation, Outcome, Request, Response},
};
use bank_ledger::{AccountId, Amount, Ledger, DEFAULT_INITIAL_ACCOUNTS, DEFAULT_INITIAL_BALANCE};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::watch;

/// Static settings of one replica
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub id: ReplicaId,
    /// Accounts `1..=initial_accounts` exist at startup
    pub initial_accounts: u32,
    pub initial_balance: Amount,
    /// Delay between executing `Halt` and raising the shutdown signal
    pub halt_grace: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            id: 0,
            initial_accounts: DEFAULT_INITIAL_ACCOUNTS,
            initial_balance: DEFAULT_INITIAL_BALANCE,
            halt_grace: Duration::from_millis(200),
        }
    }
}

/// Everything guarded by the replica's single exclusive section
struct ReplicaState {
    ledger: Ledger,
    queue: OrderQueue,
    /// Locally originated requests whose proposals are still in flight
    proposing: BTreeSet<Clock>,
}

#[derive(Debug, Default)]
struct LatencyStats {
    count: u64,
    total: Duration,
}

impl LatencyStats {
    fn average_secs(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total.as_secs_f64() / self.count as f64)
    }
}

/// One replica of the bank
pub struct Replica {
    config: ReplicaConfig,
    clock: LogicalClock,
    state: Mutex<ReplicaState>,
    /// Bumped on every queue or proposal-set mutation; waiters sleep on it
    queue_changed: watch::Sender<u64>,
    /// Fixed once bootstrap is done
    peers: RwLock<Vec<Arc<dyn PeerService>>>,
    ready: AtomicBool,
    events: Arc<dyn EventSink>,
    shutdown: ShutdownSignal,
    latency: Mutex<LatencyStats>,
}

impl Replica {
    /// Create a replica with its startup accounts funded
    pub fn new(
        config: ReplicaConfig,
        events: Arc<dyn EventSink>,
        shutdown: ShutdownSignal,
    ) -> Result<Self, ReplicaError> {
        let ledger = Ledger::with_funded_accounts(config.initial_accounts, config.initial_balance)?;
        let (queue_changed, _) = watch::channel(0);

        Ok(Self {
            clock: LogicalClock::new(config.id),
            state: Mutex::new(ReplicaState {
                ledger,
                queue: OrderQueue::new(),
                proposing: BTreeSet::new(),
            }),
            queue_changed,
            peers: RwLock::new(Vec::new()),
            ready: AtomicBool::new(false),
            events,
            shutdown,
            latency: Mutex::new(LatencyStats::default()),
            config,
        })
    }

    pub fn id(&self) -> ReplicaId {
        self.config.id
    }

    /// Origin label this replica puts on requests it multicasts
    pub fn label(&self) -> String {
        format!("Replica-{}", self.config.id)
    }

    /// Register a peer. Only meant for bootstrap, before `mark_ready`.
    pub fn add_peer(&self, peer: Arc<dyn PeerService>) {
        tracing::debug!("Replica {} added peer {}", self.config.id, peer.label());
        self.peers.write().push(peer);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Open the replica to client requests
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.emit(Event::new(EventKind::Init, self.config.id).with_params(format!(
            "{} peers, {} accounts",
            self.peer_count(),
            self.state.lock().ledger.len()
        )));
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Balance as currently applied on this replica
    pub fn balance(&self, uid: AccountId) -> Result<Amount, ReplicaError> {
        Ok(self.state.lock().ledger.balance(uid)?)
    }

    /// Every balance as currently applied on this replica
    pub fn balances(&self) -> BTreeMap<AccountId, Amount> {
        self.state.lock().ledger.balances()
    }

    /// Requests queued but not yet committed here
    pub fn pending(&self) -> Vec<Request> {
        self.state.lock().queue.pending()
    }

    /// Current logical counter
    pub fn current_clock(&self) -> u64 {
        self.clock.current()
    }

    /// Entry point for clients: run the full protocol for `request`
    pub async fn client_request(&self, request: Request) -> Result<Response, ReplicaError> {
        if !self.is_ready() {
            return Err(ReplicaError::NotReady(self.config.id));
        }

        // Reads are answered from the local ledger without ordering
        if !request.op().is_ordered() {
            let request = request.stamped(self.clock.tick());
            self.emit(Event::for_request(EventKind::ClientRequest, self.config.id, &request));
            let outcome = match request.op() {
                Operation::GetBalance { uid } => Outcome::GetBalance {
                    balance: self.balance(uid)?,
                },
                _ => Outcome::Empty,
            };
            return Ok(Response::new(request.clock(), outcome));
        }

        let started = Instant::now();

        // Assigned
        let (clock, request) = {
            let mut state = self.state.lock();
            let clock = self.clock.tick();
            let request = request.stamped(clock);
            state.queue.insert(clock, request.clone());
            state.proposing.insert(clock);
            (clock, request)
        };
        self.notify_queue_changed();
        self.emit(Event::for_request(EventKind::ClientRequest, self.config.id, &request));

        let outbound = request.relabeled(self.label());
        let peers = self.peers.read().clone();

        // Proposed
        let acks = join_all(peers.iter().map(|peer| self.propose_to(peer.as_ref(), &outbound))).await;
        self.state.lock().proposing.remove(&clock);
        self.notify_queue_changed();
        for ack in acks {
            ack?;
        }

        // Ordered
        self.wait_until_head(clock).await;

        // Committed
        let outbound = &outbound;
        let results = join_all(peers.iter().map(|peer| async move {
            (peer.label(), peer.execute(outbound).await)
        }))
        .await;
        for (peer, result) in results {
            match result {
                Ok(_) => {}
                Err(e) if e.is_delivery_failure() => {
                    tracing::error!("Commit of {} to {} failed: {}", clock, peer, e);
                    return Err(e);
                }
                // Ledger errors are deterministic, this replica hits the same one below
                Err(e) => tracing::debug!("Peer {} rejected {}: {}", peer, clock, e),
            }
        }

        self.record_latency(started.elapsed());

        self.execute_request(request).await
    }

    /// Peer entry point: queue a stamped request and acknowledge it.
    ///
    /// The ack is held back while any request this replica originated with a
    /// smaller clock is still being proposed. Once the proposer has every ack, all
    /// smaller requests it has to order behind are already queued on every replica.
    pub async fn propose_request(&self, request: Request) -> Result<Response, ReplicaError> {
        let Some(clock) = request.clock() else {
            tracing::warn!(
                "Replica {} ignoring unstamped proposal from {}",
                self.config.id,
                request.origin()
            );
            return Ok(Response::empty(None));
        };

        {
            let mut state = self.state.lock();
            self.clock.witness(clock);
            state.queue.insert(clock, request.clone());
        }
        self.notify_queue_changed();
        self.emit(Event::for_request(EventKind::ProposeReceived, self.config.id, &request));

        self.wait_for_own_proposals(clock).await;
        Ok(Response::ack(clock))
    }

    /// Peer entry point (and the final local step): apply a stamped request once
    /// everything queued ahead of it has been applied
    pub async fn execute_request(&self, request: Request) -> Result<Response, ReplicaError> {
        let Some(clock) = request.clock() else {
            tracing::warn!(
                "Replica {} ignoring unstamped execute from {}",
                self.config.id,
                request.origin()
            );
            return Ok(Response::empty(None));
        };

        self.wait_until_head(clock).await;
        self.commit(clock, &request)
    }

    async fn propose_to(
        &self,
        peer: &dyn PeerService,
        request: &Request,
    ) -> Result<Response, ReplicaError> {
        self.emit(
            Event::for_request(EventKind::ProposeSent, self.config.id, request)
                .with_params(format!("to {}", peer.label())),
        );
        let ack = peer.propose(request).await?;
        if ack.clock() != request.clock() {
            tracing::warn!(
                "Peer {} acknowledged {:?}, expected {:?}",
                peer.label(),
                ack.clock(),
                request.clock()
            );
        }
        self.emit(
            Event::for_request(EventKind::ProposeAcked, self.config.id, request)
                .with_params(format!("from {}", peer.label())),
        );
        Ok(ack)
    }

    /// Block until `clock` heads the queue or is no longer queued
    async fn wait_until_head(&self, clock: Clock) {
        let mut changed = self.queue_changed.subscribe();
        loop {
            let head = {
                let state = self.state.lock();
                match state.queue.position(clock) {
                    Some(0) | None => None,
                    Some(_) => state.queue.head_clock(),
                }
            };

            let Some(head) = head else {
                return;
            };
            tracing::trace!("Replica {} waiting for {}, head is {}", self.config.id, clock, head);

            if changed.changed().await.is_err() {
                return;
            }
        }
    }

    /// Block until no local request below `clock` is still being proposed
    async fn wait_for_own_proposals(&self, clock: Clock) {
        let mut changed = self.queue_changed.subscribe();
        loop {
            let pending = self.state.lock().proposing.range(..clock).next().copied();
            let Some(pending) = pending else {
                return;
            };
            tracing::trace!(
                "Replica {} holding ack for {} until {} is proposed",
                self.config.id,
                clock,
                pending
            );

            if changed.changed().await.is_err() {
                return;
            }
        }
    }

    /// Dequeue and apply, as one exclusive step
    fn commit(&self, clock: Clock, request: &Request) -> Result<Response, ReplicaError> {
        let mut state = self.state.lock();
        state.queue.remove_by_clock(clock);
        self.emit(Event::for_request(EventKind::Execute, self.config.id, request));

        let clock = Some(clock);
        let outcome = match request.op() {
            Operation::CreateAccount { uid } => Ok(Outcome::CreateAccount {
                uid: state.ledger.create_account(uid),
            }),
            Operation::GetBalance { uid } => state
                .ledger
                .balance(uid)
                .map(|balance| Outcome::GetBalance { balance }),
            Operation::Deposit { uid, amount } => state
                .ledger
                .deposit(uid, amount)
                .map(|success| Outcome::Deposit { success }),
            Operation::Transfer { from, to, amount } => state
                .ledger
                .transfer(from, to, amount)
                .map(|success| Outcome::Transfer { success }),
            Operation::Halt => {
                let report = HaltReport {
                    replica: self.config.id,
                    balances: state.ledger.balances(),
                    total: state.ledger.total(),
                    pending: state.queue.pending(),
                    avg_request_secs: self.latency.lock().average_secs(),
                };
                drop(state);
                self.notify_queue_changed();
                self.halt(&report);
                return Ok(Response::new(clock, Outcome::Halt { report }));
            }
            Operation::Unknown => Ok(Outcome::Empty),
        };
        drop(state);
        self.notify_queue_changed();

        Ok(Response::new(clock, outcome?))
    }

    /// Write the halt audit and schedule shutdown outside the current call
    fn halt(&self, report: &HaltReport) {
        let id = self.config.id;
        for (uid, balance) in &report.balances {
            self.emit(Event::new(EventKind::Balance, id).with_params(format!(
                "uid={}, balance={}",
                uid, balance
            )));
        }
        self.emit(Event::new(EventKind::Total, id).with_params(format!("balance={}", report.total)));
        for request in &report.pending {
            self.emit(Event::for_request(EventKind::QueueEntry, id, request));
        }
        if let Some(avg) = report.avg_request_secs {
            self.emit(Event::new(EventKind::Report, id).with_params(format!(
                "avg request time={:.4}s",
                avg
            )));
        }
        self.emit(Event::new(EventKind::Exit, id));

        tracing::info!(
            "Replica {} halting: total={}, {} pending",
            id,
            report.total,
            report.pending.len()
        );
        self.shutdown.trigger_after(self.config.halt_grace);
    }

    fn notify_queue_changed(&self) {
        self.queue_changed.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn record_latency(&self, elapsed: Duration) {
        let mut stats = self.latency.lock();
        stats.count += 1;
        stats.total += elapsed;
    }

    fn emit(&self, event: Event) {
        self.events.record(event);
    }
}

/// Builder for Replica
pub struct ReplicaBuilder {
    config: ReplicaConfig,
    events: Option<Arc<dyn EventSink>>,
    shutdown: Option<ShutdownSignal>,
}

impl ReplicaBuilder {
    pub fn new(id: ReplicaId) -> Self {
        Self {
            config: ReplicaConfig {
                id,
                ..Default::default()
            },
            events: None,
            shutdown: None,
        }
    }

    pub fn initial_accounts(mut self, count: u32, balance: Amount) -> Self {
        self.config.initial_accounts = count;
        self.config.initial_balance = balance;
        self
    }

    pub fn halt_grace(mut self, grace: Duration) -> Self {
        self.config.halt_grace = grace;
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    pub fn build(self) -> Result<Replica, ReplicaError> {
        Replica::new(
            self.config,
            self.events.unwrap_or_else(|| Arc::new(TracingSink)),
            self.shutdown.unwrap_or_default(),
        )
    }
}
