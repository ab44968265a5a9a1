//! Gateway HTTP Server
//!
//! One axum listener serves the downstream WebSocket, the snapshot queries
//! and the operational endpoints.
//!
//! # Endpoints
//!
//! - `GET /ws` - WebSocket upgrade for price subscriptions
//! - `GET /instruments/available` - tracked instruments
//! - `GET /instruments/{instrument}/latest-price` - latest price snapshot
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe
//! - `GET /readyz` - readiness probe (any feed connected)
//! - `GET /metrics` - Prometheus metrics in text format

mod health;
mod instruments;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use health::{FeedsHealth, HealthResponse, HealthStatus, SubscriptionStatus};
pub use instruments::LatestPriceResponse;

use crate::domain::prices::SharedPriceStore;
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::downstream::{self, ConnectionCounter};
use crate::infrastructure::tiingo::FeedState;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for every route.
#[derive(Debug)]
pub struct GatewayState {
    version: String,
    started_at: Instant,
    store: SharedPriceStore,
    hub: SharedBroadcastHub,
    feeds: Vec<Arc<FeedState>>,
    connections: ConnectionCounter,
    cancel: CancellationToken,
}

impl GatewayState {
    /// Create server state.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        store: SharedPriceStore,
        hub: SharedBroadcastHub,
        feeds: Vec<Arc<FeedState>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            store,
            hub,
            feeds,
            connections: ConnectionCounter::new(),
            cancel,
        }
    }

    /// Live downstream connection counter.
    #[must_use]
    pub const fn connections(&self) -> &ConnectionCounter {
        &self.connections
    }
}

// =============================================================================
// Gateway Server
// =============================================================================

/// HTTP and WebSocket server.
pub struct GatewayServer {
    port: u16,
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<GatewayState>) -> Self {
        Self { port, state }
    }

    /// Build the router over `state`.
    #[must_use]
    pub fn router(state: Arc<GatewayState>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/instruments/available", get(instruments::available_handler))
            .route(
                "/instruments/{instrument}/latest-price",
                get(instruments::latest_price_handler),
            )
            .route("/health", get(health::health_handler))
            .route("/healthz", get(health::liveness_handler))
            .route("/readyz", get(health::readiness_handler))
            .route("/metrics", get(health::metrics_handler))
            .with_state(state)
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the HTTP server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_or_else(|_| self.port.to_string(), |addr| addr.to_string());
        tracing::info!(addr = %local, "Gateway server listening");

        let cancel = self.state.cancel.clone();
        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    let hub = Arc::clone(&state.hub);
    let connections = state.connections.clone();
    let cancel = state.cancel.clone();

    ws.on_upgrade(move |socket| downstream::serve_socket(socket, hub, connections, cancel))
}

// =============================================================================
// Errors
// =============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
