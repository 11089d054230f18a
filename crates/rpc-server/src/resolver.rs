//! Endpoint resolver - turns configured addresses into live peer handles
//!
//! Replicas start in any order, so a peer that is not up yet is retried with
//! exponential backoff until it answers `identity` with the expected id.

use crate::client::{RpcPeer, DEFAULT_REQUEST_TIMEOUT};
use bank_consensus::{Event, EventKind, EventSink, PeerService, ReplicaError, ReplicaId};
use std::time::Duration;

/// Retry behaviour of the resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Delay after the first failed attempt
    pub backoff: Duration,
    /// Upper bound on the delay between attempts
    pub backoff_max: Duration,
    /// Per-call timeout of the resulting peer handle
    pub request_timeout: Duration,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(250),
            backoff_max: Duration::from_secs(5),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: None,
        }
    }
}

/// Resolve the replica `expected` at `addr` on behalf of replica `local`
pub async fn resolve_peer(
    local: ReplicaId,
    expected: ReplicaId,
    addr: &str,
    config: &ResolverConfig,
    events: &dyn EventSink,
) -> Result<RpcPeer, ReplicaError> {
    let peer = RpcPeer::new(addr, config.request_timeout)?;
    let mut delay = config.backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        events.record(
            Event::new(EventKind::PeerConnect, local)
                .with_params(format!("Replica-{} at {} (attempt {})", expected, addr, attempt)),
        );

        let failure = match peer.identity().await {
            Ok(id) if id == expected => {
                events.record(
                    Event::new(EventKind::PeerConnected, local)
                        .with_params(format!("Replica-{} at {}", expected, addr)),
                );
                return Ok(peer);
            }
            Ok(id) => format!("answered as Replica-{}", id),
            Err(e) => e.to_string(),
        };

        if config.max_attempts.is_some_and(|max| attempt >= max) {
            tracing::warn!("Giving up on Replica-{} at {}: {}", expected, addr, failure);
            return Err(ReplicaError::unreachable(addr, failure));
        }

        tracing::debug!(
            "Replica-{} at {} not available ({}), retrying in {:?}",
            expected,
            addr,
            failure,
            delay
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(config.backoff_max);
    }
}
