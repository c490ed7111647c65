//! RPC server bootstrap and the JSON-RPC 2.0 endpoint.
//!
//! Services are registered before the listener binds, so once the socket
//! accepts a connection every method is callable. Message limits and gzip
//! are applied as tower layers; compression is negotiated per call through
//! the usual Accept-Encoding / Content-Encoding headers.

use axum::extract::{DefaultBodyLimit, Extension, Json};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json as AxumJson;
use axum::Router;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::metrics::RpcMetrics;
use crate::service::FullProcessorService;
use crate::utils::errors::HostError;

/// Upper bound for a single message in either direction.
pub const MAX_MESSAGE_BYTES: usize = 128 * 1024 * 1024;

/// Lifecycle of the RPC listener, observable through [`RpcServer::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Initializing,
    Listening,
    ShuttingDown,
    Stopped,
}

/// JSON-RPC 2.0 request structure (simplified)
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
    id: Option<Value>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, v: Value) -> Self {
        Self { jsonrpc: "2.0".into(), result: Some(v), error: None, id }
    }
    fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(serde_json::json!({"code": code, "message": message})),
            id,
        }
    }
}

fn error_code(err: &HostError) -> i32 {
    match err {
        HostError::NotConfigured { .. } => -32004,
        HostError::ModuleLoad(_) => -32005,
        HostError::ShuttingDown => -32006,
        HostError::Rpc(_) => -32000,
    }
}

/// RpcServer ties together the HTTP listener and the registered service.
pub struct RpcServer {
    port: u16,
    metrics: Arc<RpcMetrics>,
    service: Option<Arc<FullProcessorService>>,
    state_tx: watch::Sender<ServerState>,
    shutdown_tx: watch::Sender<bool>,
}

impl RpcServer {
    pub fn new(port: u16, metrics: Arc<RpcMetrics>) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Initializing);
        let (shutdown_tx, _) = watch::channel(false);
        Self { port, metrics, service: None, state_tx, shutdown_tx }
    }

    /// Observe lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// Hook a service can watch to refuse new work during shutdown.
    pub fn shutdown_hook(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Handle used to initiate shutdown from outside the server.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Must be called before [`listen`](Self::listen); the endpoint set is
    /// fixed once the listener binds.
    pub fn register(&mut self, service: Arc<FullProcessorService>) {
        self.service = Some(service);
    }

    /// Bind and serve on a background task.
    ///
    /// A bind failure (port in use, no service registered) is returned to
    /// the caller so startup can abort with a non-zero exit.
    pub async fn listen(self) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        let service = self
            .service
            .ok_or_else(|| anyhow::anyhow!("no service registered before listen"))?;
        let app = router(service, self.metrics);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            anyhow::anyhow!("failed to bind processor server on {}: {}", addr, e)
        })?;
        let port = listener.local_addr()?.port();

        let state_tx = self.state_tx;
        let shutdown_tx = self.shutdown_tx;
        let mut shutdown_rx = shutdown_tx.subscribe();
        let _ = state_tx.send(ServerState::Listening);
        info!("processor server started at {}", port);

        let handle = tokio::spawn(async move {
            // our sender keeps the watch channel open for the lifetime of
            // the listener
            let shutdown = {
                let state_tx = state_tx.clone();
                async move {
                    while !*shutdown_rx.borrow_and_update() {
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                    let _ = state_tx.send(ServerState::ShuttingDown);
                    info!("processor server shutting down");
                }
            };
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(|e| {
                    error!("processor server failed: {:?}", e);
                    anyhow::anyhow!(e)
                });
            finish_serving(result, &state_tx, &shutdown_tx)
        });
        Ok(handle)
    }
}

/// Final transitions after the accept loop returns. A serve fault must
/// still flip the shutdown hook and pass through `ShuttingDown` so the
/// composed service stops accepting work.
fn finish_serving(
    result: anyhow::Result<()>,
    state_tx: &watch::Sender<ServerState>,
    shutdown_tx: &watch::Sender<bool>,
) -> anyhow::Result<()> {
    if result.is_err() {
        let _ = shutdown_tx.send(true);
        let _ = state_tx.send(ServerState::ShuttingDown);
    }
    let _ = state_tx.send(ServerState::Stopped);
    result
}

/// Build the router with the message-size and compression layers applied.
pub fn router(service: Arc<FullProcessorService>, metrics: Arc<RpcMetrics>) -> Router {
    Router::new().route("/rpc", post(json_rpc_endpoint)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(RequestDecompressionLayer::new().gzip(true))
            .layer(CompressionLayer::new().gzip(true))
            .layer(DefaultBodyLimit::max(MAX_MESSAGE_BYTES))
            .layer(Extension(service))
            .layer(Extension(metrics)),
    )
}

/// JSON-RPC router: single endpoint POST /rpc
async fn json_rpc_endpoint(
    Extension(service): Extension<Arc<FullProcessorService>>,
    Extension(metrics): Extension<Arc<RpcMetrics>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let req: JsonRpcRequest = match serde_json::from_value(payload) {
        Ok(req) => req,
        Err(_) => {
            return AxumJson(JsonRpcResponse::error(None, -32700, "Parse error"))
                .into_response();
        }
    };
    if req.jsonrpc != "2.0" {
        return AxumJson(JsonRpcResponse::error(req.id, -32600, "Invalid request"))
            .into_response();
    }

    let started = Instant::now();
    let response = dispatch(&service, &req).await;
    metrics.observe(&req.method, response.error.is_none(), started.elapsed());
    AxumJson(response).into_response()
}

async fn dispatch(service: &FullProcessorService, req: &JsonRpcRequest) -> JsonRpcResponse {
    let id = req.id.clone();
    match req.method.as_str() {
        "get_config" => match parse_params(req.params.clone()) {
            Ok(request) => match service.get_config(request).await {
                Ok(response) => result_response(id, &response),
                Err(e) => JsonRpcResponse::error(id, error_code(&e), &e.to_string()),
            },
            Err(message) => JsonRpcResponse::error(id, -32602, &message),
        },
        "start" => match parse_params(req.params.clone()) {
            Ok(request) => match service.start(request).await {
                Ok(()) => JsonRpcResponse::result(id, Value::Null),
                Err(e) => JsonRpcResponse::error(id, error_code(&e), &e.to_string()),
            },
            Err(message) => JsonRpcResponse::error(id, -32602, &message),
        },
        "stop" => match service.stop().await {
            Ok(()) => JsonRpcResponse::result(id, Value::Null),
            Err(e) => JsonRpcResponse::error(id, error_code(&e), &e.to_string()),
        },
        "process_bindings" => match parse_params(req.params.clone()) {
            Ok(request) => match service.process_bindings(request).await {
                Ok(response) => result_response(id, &response),
                Err(e) => JsonRpcResponse::error(id, error_code(&e), &e.to_string()),
            },
            Err(message) => JsonRpcResponse::error(id, -32602, &message),
        },
        _ => JsonRpcResponse::error(id, -32601, "Method not found"),
    }
}

/// Missing params mean the default request shape; present params must parse.
fn parse_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T, String> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| format!("invalid params: {}", e))
        }
    }
}

fn result_response<T: Serialize>(id: Option<Value>, value: &T) -> JsonRpcResponse {
    match serde_json::to_value(value) {
        Ok(v) => JsonRpcResponse::result(id, v),
        Err(e) => JsonRpcResponse::error(id, -32603, &format!("internal error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{ChainConfig, Endpoints};
    use crate::loader::{ModuleLoadError, ModuleLoader};
    use crate::processor::{
        ConfigRequest, ConfigResponse, ExecutionEnv, ProcessBindingsRequest,
        ProcessBindingsResponse, ProcessorHandlers, StartRequest, API_VERSION,
    };
    use crate::service::ProcessorService;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use tower::ServiceExt;

    struct StaticModule;

    #[async_trait]
    impl ProcessorHandlers for StaticModule {
        async fn get_config(&self, _request: ConfigRequest) -> anyhow::Result<ConfigResponse> {
            Ok(ConfigResponse::default())
        }
        async fn start(&self, _request: StartRequest, _env: ExecutionEnv) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn process_bindings(
            &self,
            request: ProcessBindingsRequest,
        ) -> anyhow::Result<ProcessBindingsResponse> {
            Ok(ProcessBindingsResponse { api_version: request.api_version, results: Vec::new() })
        }
    }

    struct StaticLoader;

    #[async_trait]
    impl ModuleLoader for StaticLoader {
        fn target(&self) -> &str {
            "static-module"
        }
        async fn load(
            &self,
        ) -> Result<Arc<dyn ProcessorHandlers>, ModuleLoadError> {
            Ok(Arc::new(StaticModule))
        }
    }

    fn test_app() -> Router {
        let mut config = HashMap::new();
        config.insert(
            "1".to_string(),
            ChainConfig { chain_server: Some("a:50051".to_string()), https: None },
        );
        let endpoints = Arc::new(Endpoints::from_chains_config(&config, 2, "", ""));
        let (_, shutdown_rx) = watch::channel(false);
        let base = ProcessorService::new(Arc::new(StaticLoader), endpoints, shutdown_rx);
        let service = Arc::new(FullProcessorService::new(base));
        let metrics = Arc::new(RpcMetrics::new().unwrap());
        router(service, metrics)
    }

    async fn call(app: Router, body: Value) -> Value {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_config_returns_current_api_version() {
        let body = serde_json::json!({
            "jsonrpc": "2.0", "method": "get_config", "params": {}, "id": 1
        });
        let response = call(test_app(), body).await;
        assert_eq!(response["result"]["api_version"], API_VERSION);
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn test_unknown_method_is_method_not_found() {
        let body = serde_json::json!({
            "jsonrpc": "2.0", "method": "frobnicate", "id": 2
        });
        let response = call(test_app(), body).await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version_is_invalid_request() {
        let body = serde_json::json!({
            "jsonrpc": "1.0", "method": "get_config", "id": 3
        });
        let response = call(test_app(), body).await;
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_unconfigured_chain_maps_to_rpc_error() {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "process_bindings",
            "params": { "bindings": [{ "chain_id": "9" }] },
            "id": 4
        });
        let response = call(test_app(), body).await;
        assert_eq!(response["error"]["code"], -32004);
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.contains("chain 9"));
    }

    #[tokio::test]
    async fn test_lifecycle_states_are_observable() {
        let mut config = HashMap::new();
        config.insert(
            "1".to_string(),
            ChainConfig { chain_server: Some("a:50051".to_string()), https: None },
        );
        let endpoints = Arc::new(Endpoints::from_chains_config(&config, 2, "", ""));
        let metrics = Arc::new(RpcMetrics::new().unwrap());
        let mut server = RpcServer::new(0, metrics);

        let mut state = server.state();
        assert_eq!(*state.borrow(), ServerState::Initializing);

        let base =
            ProcessorService::new(Arc::new(StaticLoader), endpoints, server.shutdown_hook());
        server.register(Arc::new(FullProcessorService::new(base)));

        let shutdown = server.shutdown_handle();
        let handle = server.listen().await.unwrap();
        assert_eq!(*state.borrow_and_update(), ServerState::Listening);

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(*state.borrow_and_update(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_serve_fault_fires_shutdown_hook() {
        let (state_tx, mut state_rx) = watch::channel(ServerState::Listening);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let err = finish_serving(Err(anyhow::anyhow!("accept failed")), &state_tx, &shutdown_tx)
            .unwrap_err();
        assert!(err.to_string().contains("accept failed"));
        assert!(*shutdown_rx.borrow());
        assert_eq!(*state_rx.borrow_and_update(), ServerState::Stopped);

        // a clean return leaves the hook alone
        let (state_tx, _state_rx) = watch::channel(ServerState::Listening);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        finish_serving(Ok(()), &state_tx, &shutdown_tx).unwrap();
        assert!(!*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_listen_without_service_fails() {
        let server = RpcServer::new(0, Arc::new(RpcMetrics::new().unwrap()));
        assert!(server.listen().await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = test_app()
            .oneshot(Request::builder().uri("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
