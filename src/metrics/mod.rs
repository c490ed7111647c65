//! Merged metrics exposition on an independent listener.
//!
//! Two collections feed one `/metrics` endpoint: the process-global default
//! registry (any component may register into it) and the RPC registry the
//! server populates for every dispatched call. The exporter runs on its own
//! TCP socket and failure domain; a stall in metrics collection never
//! touches RPC availability, and the listener stays up until the process
//! terminates.

use anyhow::Context;
use axum::extract::Extension;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Fixed exporter port, separate from the RPC listener.
pub const METRICS_PORT: u16 = 4040;

/// Per-RPC metrics collection, populated for every dispatched call.
pub struct RpcMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
    configured_chains: IntGauge,
}

impl RpcMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("rpc_requests_total", "Total RPC calls by method and status"),
            &["method", "status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new("rpc_request_duration_seconds", "RPC call latency by method"),
            &["method"],
        )?;
        let configured_chains = IntGauge::new(
            "chainhost_configured_chains",
            "Chains with a resolved endpoint",
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(configured_chains.clone()))?;
        Ok(Self { registry, requests, latency, configured_chains })
    }

    /// Record how many chains resolved to a usable endpoint.
    pub fn set_configured_chains(&self, count: usize) {
        self.configured_chains.set(count as i64);
    }

    /// Record one dispatched call.
    pub fn observe(&self, method: &str, ok: bool, elapsed: Duration) {
        let status = if ok { "ok" } else { "error" };
        self.requests.with_label_values(&[method, status]).inc();
        self.latency.with_label_values(&[method]).observe(elapsed.as_secs_f64());
    }

    /// Merge the global default registry with the RPC registry and encode
    /// the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut families = prometheus::gather();
        families.extend(self.registry.gather());
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Exporter router: `GET /metrics` serves the merged collection; any other
/// method or path is a 404 with an empty body.
pub fn router(metrics: Arc<RpcMetrics>) -> Router {
    Router::new().route("/metrics", any(metrics_endpoint)).layer(Extension(metrics))
}

async fn metrics_endpoint(
    method: Method,
    Extension(metrics): Extension<Arc<RpcMetrics>>,
) -> impl IntoResponse {
    if method != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }
    match metrics.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            // collection failure must not take the listener down
            error!("failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Bind the exporter and serve it on a background task.
///
/// Bind failure is startup-fatal for the caller; once bound, the listener
/// serves until the process exits.
pub async fn listen(
    metrics: Arc<RpcMetrics>,
    port: u16,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    info!("metric server started at {}", listener.local_addr()?.port());

    let app = router(metrics);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("metrics listener failed: {:?}", e);
            return Err(anyhow::anyhow!(e));
        }
        Ok(())
    });
    Ok(handle)
}
