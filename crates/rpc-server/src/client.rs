//! Remote replica over JSON-RPC/HTTP
//!
//! Used by replicas to reach their peers and by the workload client.

use crate::methods::{method, replica_error_from_parts};
use async_trait::async_trait;
use bank_consensus::{PeerService, ReplicaError, ReplicaId, Request, Response};
use jsonrpsee::{
    core::client::{ClientT, Error as ClientError},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use std::time::Duration;

/// Default per-call timeout. Commits can wait behind other requests, so this is long.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Handle on one remote replica
#[derive(Debug, Clone)]
pub struct RpcPeer {
    addr: String,
    client: HttpClient,
}

impl RpcPeer {
    /// Connect lazily to `addr` (`host:port`); no traffic is sent until the first call
    pub fn new(addr: impl Into<String>, request_timeout: Duration) -> Result<Self, ReplicaError> {
        let addr = addr.into();
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(format!("http://{}", addr))
            .map_err(|e| ReplicaError::unreachable(addr.clone(), e))?;
        Ok(Self { addr, client })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Submit a client request to this replica
    pub async fn client_request(&self, request: &Request) -> Result<Response, ReplicaError> {
        self.call(method::CLIENT_REQUEST, request).await
    }

    async fn call(&self, method: &str, request: &Request) -> Result<Response, ReplicaError> {
        self.client
            .request(method, rpc_params![request])
            .await
            .map_err(|e| self.map_error(e))
    }

    /// Errors raised by the remote replica keep their meaning; anything else is a
    /// delivery failure
    fn map_error(&self, error: ClientError) -> ReplicaError {
        match &error {
            ClientError::Call(obj) => {
                let data = obj
                    .data()
                    .and_then(|raw| serde_json::from_str(raw.get()).ok());
                replica_error_from_parts(obj.code(), data.as_ref()).unwrap_or_else(|| {
                    ReplicaError::unreachable(self.addr.clone(), obj.message())
                })
            }
            _ => ReplicaError::unreachable(self.addr.clone(), &error),
        }
    }
}

#[async_trait]
impl PeerService for RpcPeer {
    fn label(&self) -> String {
        self.addr.clone()
    }

    async fn identity(&self) -> Result<ReplicaId, ReplicaError> {
        self.client
            .request(method::IDENTITY, rpc_params![])
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn propose(&self, request: &Request) -> Result<Response, ReplicaError> {
        self.call(method::PROPOSE_REQUEST, request).await
    }

    async fn execute(&self, request: &Request) -> Result<Response, ReplicaError> {
        self.call(method::EXECUTE_REQUEST, request).await
    }
}
