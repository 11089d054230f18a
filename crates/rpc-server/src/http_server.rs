//! HTTP JSON-RPC Server
//!
//! Provides the HTTP endpoint a replica serves to clients and peers.

use crate::{
    methods::{
        handle_client_request, handle_execute_request, handle_identity, handle_propose_request,
        method, RpcContext, RpcError,
    },
    RpcServerConfig,
};
use anyhow::Context;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use bank_consensus::{Request, ShutdownSignal};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{future::IntoFuture, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// HTTP RPC Server
pub struct HttpRpcServer {
    config: RpcServerConfig,
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    /// Create a new HTTP RPC server
    pub fn new(config: RpcServerConfig, context: Arc<RpcContext>) -> Self {
        Self { config, context }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        TcpListener::bind(&self.config.http_addr)
            .await
            .with_context(|| format!("Cannot bind {}", self.config.http_addr))
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .layer(TraceLayer::new_for_http())
            .with_state(self.context)
    }

    /// Serve on an already bound listener until `shutdown` is raised.
    ///
    /// In-flight calls get `drain_timeout` to finish, so the reply to `Halt` still
    /// goes out. Calls still blocked after that are abandoned.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> anyhow::Result<()> {
        let local: SocketAddr = listener.local_addr()?;
        let drain_timeout = self.config.drain_timeout;
        tracing::info!("HTTP RPC server listening on {}", local);

        let signal = shutdown.clone();
        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { signal.wait().await })
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => result?,
            _ = shutdown.wait() => {
                if let Ok(result) = tokio::time::timeout(drain_timeout, &mut server).await {
                    result?;
                } else {
                    tracing::warn!(
                        "HTTP RPC server on {} dropped calls still running after {:?}",
                        local,
                        drain_timeout
                    );
                }
            }
        }

        tracing::info!("HTTP RPC server on {} stopped", local);
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let result = if request.jsonrpc != "2.0" {
        Err(RpcError::InvalidRequest(format!(
            "Unsupported jsonrpc version {}",
            request.jsonrpc
        )))
    } else {
        dispatch_method(&context, &request.method, request.params).await
    };

    let response = match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => {
            tracing::debug!("RPC method {} failed: {}", request.method, e);
            JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(JsonRpcError {
                    code: e.code(),
                    message: e.to_string(),
                    data: e.data(),
                }),
            }
        }
    };

    (StatusCode::OK, Json(response))
}

/// Dispatch to appropriate method handler
async fn dispatch_method(ctx: &RpcContext, method: &str, params: Value) -> Result<Value, RpcError> {
    tracing::trace!("RPC method called: {}", method);
    match method {
        method::IDENTITY => {
            let id = handle_identity(ctx)?;
            Ok(json!(id))
        }

        method::CLIENT_REQUEST => {
            let request = request_param(params)?;
            to_value(handle_client_request(ctx, request).await?)
        }

        method::PROPOSE_REQUEST => {
            let request = request_param(params)?;
            to_value(handle_propose_request(ctx, request).await?)
        }

        method::EXECUTE_REQUEST => {
            let request = request_param(params)?;
            to_value(handle_execute_request(ctx, request).await?)
        }

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

/// Extract the single request argument, passed either positionally or by name
fn request_param(params: Value) -> Result<Request, RpcError> {
    let value = match params {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Object(mut fields) if fields.contains_key("request") => {
            fields.remove("request").unwrap_or(Value::Null)
        }
        _ => return Err(RpcError::InvalidParams("Missing request".to_string())),
    };

    serde_json::from_value(value)
        .map_err(|e| RpcError::InvalidParams(format!("Invalid request: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_consensus::Operation;

    #[test]
    fn test_request_param_positional_and_named() {
        let req = Request::deposit(1, 10, "c");
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(request_param(json!([value.clone()])).unwrap(), req);
        assert_eq!(request_param(json!({ "request": value })).unwrap(), req);
    }

    #[test]
    fn test_request_param_accepts_malformed_op() {
        let req = request_param(json!([{ "op": { "kind": 7 }, "origin": "c" }])).unwrap();
        assert_eq!(req.op(), Operation::Unknown);

        let req = request_param(json!({ "request": { "op": { "kind": "transfer", "from": 1 } } }))
            .unwrap();
        assert_eq!(req.op(), Operation::Unknown);
    }

    #[test]
    fn test_request_param_rejects_garbage() {
        assert!(matches!(
            request_param(json!([])),
            Err(RpcError::InvalidParams(_))
        ));
        assert!(matches!(
            request_param(json!(["not a request"])),
            Err(RpcError::InvalidParams(_))
        ));
        assert!(matches!(
            request_param(Value::Null),
            Err(RpcError::InvalidParams(_))
        ));
    }
}
