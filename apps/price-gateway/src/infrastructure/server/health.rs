//! Health and metrics handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::GatewayState;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::tiingo::FeedSnapshot;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed status.
    pub feeds: FeedsHealth,
    /// Open downstream connections.
    pub connections: usize,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every feed is connected.
    Healthy,
    /// Some feeds are connected.
    Degraded,
    /// No feed is connected.
    Unhealthy,
}

/// Per-feed snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct FeedsHealth {
    /// Feeds currently connected.
    pub connected: usize,
    /// Feeds configured.
    pub total: usize,
    /// Feed details.
    pub details: Vec<FeedSnapshot>,
}

/// Subscription statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubscriptionStatus {
    /// Instruments with a price in the store.
    pub tracked_instruments: usize,
    /// Instruments with a subscriber set.
    pub subscribed_instruments: usize,
    /// Total (instrument, connection) memberships.
    pub memberships: usize,
}

// =============================================================================
// Handlers
// =============================================================================

pub(super) async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    if state.feeds.iter().any(|feed| feed.is_connected()) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &GatewayState) -> HealthResponse {
    let details: Vec<FeedSnapshot> = state.feeds.iter().map(|feed| feed.snapshot()).collect();
    let connected = details.iter().filter(|feed| feed.connected).count();
    let hub_stats = state.hub.stats();

    HealthResponse {
        status: determine_health_status(connected, details.len()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feeds: FeedsHealth {
            connected,
            total: details.len(),
            details,
        },
        connections: state.connections.active(),
        subscriptions: SubscriptionStatus {
            tracked_instruments: state.store.len(),
            subscribed_instruments: hub_stats.instruments,
            memberships: hub_stats.subscriptions,
        },
    }
}

const fn determine_health_status(connected: usize, total: usize) -> HealthStatus {
    if connected == 0 {
        HealthStatus::Unhealthy
    } else if connected == total {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::prices::PriceStore;
    use crate::infrastructure::broadcast::BroadcastHub;
    use crate::infrastructure::server::GatewayServer;
    use crate::infrastructure::tiingo::{ConnectionState, FeedKind, FeedState};

    fn state(crypto: ConnectionState, forex: ConnectionState) -> Arc<GatewayState> {
        let crypto_state = Arc::new(FeedState::new(FeedKind::Crypto));
        crypto_state.set_state(crypto);
        let forex_state = Arc::new(FeedState::new(FeedKind::Forex));
        forex_state.set_state(forex);

        Arc::new(GatewayState::new(
            "test",
            Arc::new(PriceStore::new()),
            Arc::new(BroadcastHub::with_defaults()),
            vec![crypto_state, forex_state],
            CancellationToken::new(),
        ))
    }

    async fn get(state: Arc<GatewayState>, uri: &str) -> (StatusCode, String) {
        let response = GatewayServer::router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status() {
        assert_eq!(determine_health_status(2, 2), HealthStatus::Healthy);
        assert_eq!(determine_health_status(1, 2), HealthStatus::Degraded);
        assert_eq!(determine_health_status(0, 2), HealthStatus::Unhealthy);
        assert_eq!(determine_health_status(0, 0), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn health_reports_degraded_feeds() {
        let (status, body) = get(
            state(ConnectionState::Connected, ConnectionState::Reconnecting),
            "/health",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["version"], "test");
        assert_eq!(json["feeds"]["connected"], 1);
        assert_eq!(json["feeds"]["details"][1]["state"], "reconnecting");
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn health_unavailable_without_feeds() {
        let (status, body) = get(
            state(ConnectionState::Disconnected, ConnectionState::Connecting),
            "/health",
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("\"unhealthy\""));
    }

    #[tokio::test]
    async fn readiness_needs_one_feed() {
        let (status, body) = get(
            state(ConnectionState::Disconnected, ConnectionState::Connected),
            "/readyz",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");

        let (status, _) = get(
            state(ConnectionState::Disconnected, ConnectionState::Disconnected),
            "/readyz",
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get(
            state(ConnectionState::Disconnected, ConnectionState::Disconnected),
            "/healthz",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
