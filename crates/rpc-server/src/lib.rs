//! Bank RPC - JSON-RPC over HTTP for the replicated ledger
//!
//! Provides:
//! - HTTP JSON-RPC server: identity, clientRequest, proposeRequest, executeRequest
//! - `RpcPeer`: a remote replica, usable as a protocol peer or by clients
//! - Resolver: connects to configured peers with retry and backoff

pub mod client;
pub mod http_server;
pub mod methods;
pub mod resolver;


pub use client::{RpcPeer, DEFAULT_REQUEST_TIMEOUT};
pub use http_server::HttpRpcServer;
pub use methods::{RpcContext, RpcError};
pub use resolver::{resolve_peer, ResolverConfig};

use std::time::Duration;

/// Default time in-flight calls get to finish once shutdown is raised
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// RPC Server configuration
#[derive(Clone, Debug)]
pub struct RpcServerConfig {
    /// HTTP RPC bind address
    pub http_addr: String,
    /// How long shutdown waits for in-flight calls
    pub drain_timeout: Duration,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9000".to_string(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
