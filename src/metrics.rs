//! Prometheus metrics for relayd, exposed on a tiny `axum` HTTP endpoint.
//!
//! Matches the teacher's `metrics.rs`/`http.rs` split: a `lazy_static`
//! registry populated by `init()`, gathered by `gather_metrics()`, served
//! from a background task the caller spawns when `metrics_port != 0`.

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::net::SocketAddr;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref MESSAGES_PUBLISHED: IntCounter =
        IntCounter::new("relayd_messages_published_total", "Total messages published").unwrap();

    pub static ref REQUESTS_FAILED: IntCounter =
        IntCounter::new("relayd_requests_failed_total", "Total requests that returned an error").unwrap();

    pub static ref FAN_OUT_FRAMES_DROPPED: IntCounter = IntCounter::new(
        "relayd_fan_out_frames_dropped_total",
        "Fan-out frames dropped for a slow consumer"
    )
    .unwrap();

    pub static ref CONNECTED_SESSIONS: IntGauge =
        IntGauge::new("relayd_connected_sessions", "Currently connected sessions").unwrap();
}

/// Register every metric. Must be called once at startup before any
/// metric is recorded.
pub fn init() {
    REGISTRY.register(Box::new(MESSAGES_PUBLISHED.clone())).unwrap();
    REGISTRY.register(Box::new(REQUESTS_FAILED.clone())).unwrap();
    REGISTRY.register(Box::new(FAN_OUT_FRAMES_DROPPED.clone())).unwrap();
    REGISTRY.register(Box::new(CONNECTED_SESSIONS.clone())).unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

async fn metrics_handler() -> String {
    gather_metrics()
}

/// Serve `/metrics` until the process exits. Intended to be spawned as a
/// background task; binding failures are logged, not fatal to the server.
pub async fn run_http_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "metrics endpoint listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind metrics endpoint");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "metrics endpoint stopped");
    }
}
