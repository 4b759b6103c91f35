//! An RPC-intercepting proxy fronting one L2 chain node.
//!
//! The proxy answers `eth_chainId` locally, refuses node-admin methods, and
//! forwards everything else to the backing node. External users talk to the
//! proxy endpoint; the raw node endpoint stays private to the orchestrator.

use crate::{
    ProxyError, ProxyProcess,
    config::ProxyConfig,
};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    routing::post,
};
use omnisim_types::ChainLifecycleState;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HOST: &str = "127.0.0.1";

/// The HTTP JSON-RPC proxy in front of an L2 chain node.
#[derive(Debug)]
pub struct RpcProxy {
    config: ProxyConfig,
    port: u16,
    backend_url: String,

    state: Arc<Mutex<ChainLifecycleState>>,
    shutdown: Mutex<Option<CancellationToken>>,
    serve_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    http: reqwest::Client,
}

#[derive(Debug)]
struct ProxyState {
    chain_id: u64,
    backend_url: String,
    http: reqwest::Client,
}

impl RpcProxy {
    /// Creates a proxy for the chain node reachable at `backend_url`,
    /// reserving a port when the config asks for an ephemeral one.
    pub fn new(mut config: ProxyConfig, backend_url: String) -> Result<Self, ProxyError> {
        let port = if config.port == 0 {
            crate::pick_unused_port()
                .map_err(|source| ProxyError::PortAllocation { chain_id: config.chain_id, source })?
        } else {
            config.port
        };
        config.port = port;

        Ok(Self {
            config,
            port,
            backend_url,
            state: Arc::new(Mutex::new(ChainLifecycleState::NotStarted)),
            shutdown: Mutex::new(None),
            serve_task: tokio::sync::Mutex::new(None),
            http: reqwest::Client::new(),
        })
    }

    /// The port the proxy listens on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    fn set_state(&self, next: ChainLifecycleState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

#[async_trait]
impl ProxyProcess for RpcProxy {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn endpoint(&self) -> String {
        format!("http://{HOST}:{}", self.port)
    }

    fn config(&self) -> ProxyConfig {
        self.config.clone()
    }

    fn state(&self) -> ChainLifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), ProxyError> {
        let chain_id = self.config.chain_id;
        if !self.state().can_start() {
            return Err(ProxyError::AlreadyStarted { chain_id });
        }
        self.set_state(ChainLifecycleState::Starting);

        let listener = match TcpListener::bind((HOST, self.port)).await {
            Ok(listener) => listener,
            Err(source) => {
                self.set_state(ChainLifecycleState::Failed);
                return Err(ProxyError::Bind { chain_id, source });
            }
        };

        let shared = Arc::new(ProxyState {
            chain_id,
            backend_url: self.backend_url.clone(),
            http: self.http.clone(),
        });
        let app = Router::new().route("/", post(handle_rpc)).with_state(shared);

        let shutdown = cancel.child_token();
        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(serve_shutdown.cancelled_owned())
                .await
            {
                warn!(target: "omnisim::proxy", chain_id, %err, "proxy server exited with error");
            }
        });

        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown);
        *self.serve_task.lock().await = Some(task);
        self.set_state(ChainLifecycleState::Running);
        info!(target: "omnisim::proxy", chain_id, port = self.port, "proxy serving");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProxyError> {
        let chain_id = self.config.chain_id;
        let Some(task) = self.serve_task.lock().await.take() else {
            return Err(ProxyError::AlreadyStopped { chain_id });
        };

        self.set_state(ChainLifecycleState::Stopping);
        if let Some(shutdown) = self.shutdown.lock().unwrap_or_else(|e| e.into_inner()).take() {
            shutdown.cancel();
        }
        let result = task
            .await
            .map_err(|err| ProxyError::StopJoin { chain_id, message: err.to_string() });
        self.set_state(ChainLifecycleState::Stopped);
        info!(target: "omnisim::proxy", chain_id, "proxy stopped");
        result
    }
}

async fn handle_rpc(State(state): State<Arc<ProxyState>>, Json(request): Json<Value>) -> Json<Value> {
    // Batches are forwarded wholesale; per-method interception applies to
    // single requests only.
    if request.is_array() {
        return Json(forward(&state, &request).await);
    }

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();

    if method == "eth_chainId" {
        return Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": format!("0x{:x}", state.chain_id),
        }));
    }

    if method.starts_with("admin_") {
        debug!(target: "omnisim::proxy", chain_id = state.chain_id, method, "refusing admin method");
        return Json(rpc_error(id, -32601, format!("method `{method}` is not available through the proxy")));
    }

    Json(forward(&state, &request).await)
}

async fn forward(state: &ProxyState, request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let response = state.http.post(&state.backend_url).json(request).send().await;
    match response {
        Ok(response) => match response.json::<Value>().await {
            Ok(body) => body,
            Err(err) => {
                warn!(target: "omnisim::proxy", chain_id = state.chain_id, %err, "backend returned malformed response");
                rpc_error(id, -32603, format!("malformed backend response: {err}"))
            }
        },
        Err(err) => {
            warn!(target: "omnisim::proxy", chain_id = state.chain_id, %err, "failed to reach backend chain node");
            rpc_error(id, -32603, format!("failed to reach backing chain: {err}"))
        }
    }
}

fn rpc_error(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_proxy() -> RpcProxy {
        RpcProxy::new(
            ProxyConfig::new(901, "test-901", 0),
            "http://127.0.0.1:1".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn serves_chain_id_locally() {
        let proxy = test_proxy();
        proxy.start(CancellationToken::new()).await.unwrap();

        let response: Value = reqwest::Client::new()
            .post(proxy.endpoint())
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "eth_chainId", "params": []}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["result"], json!(format!("0x{:x}", 901)));

        proxy.stop().await.unwrap();
    }

    #[tokio::test]
    async fn refuses_admin_methods() {
        let proxy = test_proxy();
        proxy.start(CancellationToken::new()).await.unwrap();

        let response: Value = reqwest::Client::new()
            .post(proxy.endpoint())
            .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "admin_nodeInfo", "params": []}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(-32601));
        assert_eq!(response["id"], json!(7));

        proxy.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_start_and_double_stop_are_rejected() {
        let proxy = test_proxy();
        proxy.start(CancellationToken::new()).await.unwrap();
        assert!(matches!(
            proxy.start(CancellationToken::new()).await,
            Err(ProxyError::AlreadyStarted { chain_id: 901 })
        ));

        proxy.stop().await.unwrap();
        assert!(matches!(proxy.stop().await, Err(ProxyError::AlreadyStopped { chain_id: 901 })));
        assert_eq!(proxy.state(), ChainLifecycleState::Stopped);
    }

    #[tokio::test]
    async fn run_level_cancellation_stops_serving() {
        let proxy = test_proxy();
        let cancel = CancellationToken::new();
        proxy.start(cancel.clone()).await.unwrap();
        cancel.cancel();

        // The serve task winds down on its own; stop() still joins it.
        proxy.stop().await.unwrap();
    }
}
