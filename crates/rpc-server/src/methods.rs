//! RPC Methods - JSON-RPC method handlers
//!
//! Every replica serves the same four methods: `identity` for bootstrap,
//! `clientRequest` for clients, and `proposeRequest` / `executeRequest` for peers.

use bank_consensus::{Replica, ReplicaError, ReplicaId, Request, Response};
use bank_ledger::LedgerError;
use serde_json::{json, Value};
use std::sync::Arc;

/// JSON-RPC method names
pub mod method {
    pub const IDENTITY: &str = "identity";
    pub const CLIENT_REQUEST: &str = "clientRequest";
    pub const PROPOSE_REQUEST: &str = "proposeRequest";
    pub const EXECUTE_REQUEST: &str = "executeRequest";
}

/// JSON-RPC error codes
pub mod code {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const ACCOUNT_NOT_FOUND: i32 = -32001;
    pub const BALANCE_OVERFLOW: i32 = -32002;
    pub const NOT_READY: i32 = -32003;
    pub const PEER_UNREACHABLE: i32 = -32004;
}

/// RPC context shared across handlers
pub struct RpcContext {
    pub replica: Arc<Replica>,
}

impl RpcContext {
    pub fn new(replica: Arc<Replica>) -> Self {
        Self { replica }
    }
}

// ============ RPC Handlers ============

/// Handle identity RPC method
pub fn handle_identity(ctx: &RpcContext) -> Result<ReplicaId, RpcError> {
    Ok(ctx.replica.id())
}

/// Handle clientRequest RPC method
pub async fn handle_client_request(ctx: &RpcContext, request: Request) -> Result<Response, RpcError> {
    Ok(ctx.replica.client_request(request).await?)
}

/// Handle proposeRequest RPC method
pub async fn handle_propose_request(ctx: &RpcContext, request: Request) -> Result<Response, RpcError> {
    Ok(ctx.replica.propose_request(request).await?)
}

/// Handle executeRequest RPC method
pub async fn handle_execute_request(ctx: &RpcContext, request: Request) -> Result<Response, RpcError> {
    Ok(ctx.replica.execute_request(request).await?)
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error(transparent)]
    Replica(#[from] ReplicaError),
}

impl RpcError {
    /// JSON-RPC error code
    pub fn code(&self) -> i32 {
        match self {
            RpcError::InvalidRequest(_) => code::INVALID_REQUEST,
            RpcError::InvalidParams(_) => code::INVALID_PARAMS,
            RpcError::MethodNotFound(_) => code::METHOD_NOT_FOUND,
            RpcError::InternalError(_) => code::INTERNAL_ERROR,
            RpcError::Replica(ReplicaError::Ledger(LedgerError::NotFound(_))) => {
                code::ACCOUNT_NOT_FOUND
            }
            RpcError::Replica(ReplicaError::Ledger(LedgerError::Overflow(_))) => {
                code::BALANCE_OVERFLOW
            }
            RpcError::Replica(ReplicaError::NotReady(_)) => code::NOT_READY,
            RpcError::Replica(ReplicaError::PeerUnreachable { .. }) => code::PEER_UNREACHABLE,
        }
    }

    /// Structured detail carried in the error object's `data` member
    pub fn data(&self) -> Option<Value> {
        match self {
            RpcError::Replica(ReplicaError::Ledger(
                LedgerError::NotFound(uid) | LedgerError::Overflow(uid),
            )) => Some(json!({ "uid": uid })),
            RpcError::Replica(ReplicaError::NotReady(replica)) => {
                Some(json!({ "replica": replica }))
            }
            RpcError::Replica(ReplicaError::PeerUnreachable { peer, reason }) => {
                Some(json!({ "peer": peer, "reason": reason }))
            }
            _ => None,
        }
    }
}

/// Rebuild the replica error behind a JSON-RPC error object.
///
/// `None` when the code is not one of ours or the data is missing.
pub fn replica_error_from_parts(code: i32, data: Option<&Value>) -> Option<ReplicaError> {
    let field = |name: &str| data.and_then(|d| d.get(name));
    let uid = || {
        field("uid")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };

    match code {
        code::ACCOUNT_NOT_FOUND => uid().map(|uid| LedgerError::NotFound(uid).into()),
        code::BALANCE_OVERFLOW => uid().map(|uid| LedgerError::Overflow(uid).into()),
        code::NOT_READY => field("replica")
            .and_then(Value::as_u64)
            .and_then(|v| ReplicaId::try_from(v).ok())
            .map(ReplicaError::NotReady),
        code::PEER_UNREACHABLE => Some(ReplicaError::unreachable(
            field("peer").and_then(Value::as_str).unwrap_or_default(),
            field("reason").and_then(Value::as_str).unwrap_or_default(),
        )),
        _ => None,
    }
}
