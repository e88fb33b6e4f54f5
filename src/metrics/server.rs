//! Scrape and status endpoints.
//!
//! - `GET /metrics`: Prometheus text format
//! - `GET /status`: the last published snapshot as JSON
//! - `GET /health`: `200 recording` / `200 idle`, or `503` before the first
//!   snapshot arrives

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind metrics listener: {0}")]
    Bind(#[from] std::io::Error),
    #[error("metrics server failed: {0}")]
    Serve(String),
}

/// Where the exporter listens.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    /// Loopback only; the recorder is not meant to be reachable from outside
    /// the device unless configured so.
    fn default() -> Self {
        Self::with_port(9464)
    }
}

impl MetricsServerConfig {
    /// Loopback address with a custom port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
        }
    }
}

/// Registry plus the last snapshot published into it.
pub struct MetricsState {
    registry: MetricsRegistry,
    last: Option<MetricsSnapshot>,
}

impl MetricsState {
    /// Publishes a snapshot to every endpoint.
    pub fn update(&mut self, snapshot: &MetricsSnapshot) {
        self.registry.update(snapshot);
        self.last = Some(snapshot.clone());
    }

    pub fn last_snapshot(&self) -> Option<&MetricsSnapshot> {
        self.last.as_ref()
    }
}

type SharedState = Arc<RwLock<MetricsState>>;

/// Serves the capture metrics over HTTP.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: SharedState,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState {
                registry,
                last: None,
            })),
        }
    }

    /// Handle used by the capture loop to publish snapshots.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    fn router(state: SharedState) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .route("/status", get(status))
            .route("/health", get(health))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serves until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then lets open requests finish.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::debug!("Metrics server stopped");
        Ok(())
    }
}

async fn scrape(State(state): State<SharedState>) -> Response {
    match state.read().await.registry.encode() {
        Ok(text) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}

async fn status(State(state): State<SharedState>) -> Response {
    match state.read().await.last_snapshot() {
        Some(snapshot) => Json(snapshot.clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no snapshot yet").into_response(),
    }
}

async fn health(State(state): State<SharedState>) -> Response {
    match state.read().await.last_snapshot() {
        Some(s) if s.recording => (StatusCode::OK, "recording").into_response(),
        Some(_) => (StatusCode::OK, "idle").into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response(),
    }
}
