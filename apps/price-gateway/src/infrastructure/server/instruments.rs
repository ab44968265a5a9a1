//! Snapshot query handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::GatewayState;
use crate::domain::streaming::{InstrumentSymbol, PriceTick};

/// Latest price of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestPriceResponse {
    /// Price of record, or 0 for an instrument with no data yet.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Time of the price.
    pub timestamp: DateTime<Utc>,
}

impl From<PriceTick> for LatestPriceResponse {
    fn from(tick: PriceTick) -> Self {
        Self {
            price: tick.price(),
            timestamp: tick.timestamp(),
        }
    }
}

pub(super) async fn available_handler(
    State(state): State<Arc<GatewayState>>,
) -> Json<Vec<InstrumentSymbol>> {
    Json(state.store.symbols())
}

pub(super) async fn latest_price_handler(
    State(state): State<Arc<GatewayState>>,
    Path(instrument): Path<String>,
) -> Response {
    let Some(symbol) = InstrumentSymbol::parse(&instrument) else {
        return (StatusCode::BAD_REQUEST, "instrument must not be blank").into_response();
    };

    Json(LatestPriceResponse::from(state.store.latest(&symbol))).into_response()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::TimeZone;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::prices::PriceStore;
    use crate::infrastructure::broadcast::BroadcastHub;
    use crate::infrastructure::server::GatewayServer;

    fn symbol(s: &str) -> InstrumentSymbol {
        InstrumentSymbol::parse(s).unwrap()
    }

    fn state(store: PriceStore) -> Arc<GatewayState> {
        Arc::new(GatewayState::new(
            "test",
            Arc::new(store),
            Arc::new(BroadcastHub::with_defaults()),
            Vec::new(),
            CancellationToken::new(),
        ))
    }

    async fn get_json(state: Arc<GatewayState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = GatewayServer::router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn lists_available_instruments_sorted() {
        let store = PriceStore::seeded([symbol("xrpusdt"), symbol("btcusdt"), symbol("eurusd")]);

        let (status, json) = get_json(state(store), "/instruments/available").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!(["btcusdt", "eurusd", "xrpusdt"]));
    }

    #[tokio::test]
    async fn latest_price_is_case_insensitive() {
        let store = PriceStore::new();
        let at = Utc.with_ymd_and_hms(2025, 2, 28, 18, 46, 38).unwrap();
        let tick = PriceTick::new(symbol("btcusdt"), Decimal::from_str("84250.5").unwrap(), at)
            .unwrap();
        store.upsert(&symbol("btcusdt"), tick);

        let (status, json) = get_json(state(store), "/instruments/BTCUSDT/latest-price").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({"price": 84250.5, "timestamp": "2025-02-28T18:46:38Z"})
        );
    }

    #[tokio::test]
    async fn unknown_instrument_has_zero_price() {
        let before = Utc::now();

        let (status, json) =
            get_json(state(PriceStore::new()), "/instruments/nope/latest-price").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["price"], serde_json::json!(0.0));
        let timestamp: DateTime<Utc> =
            serde_json::from_value(json["timestamp"].clone()).unwrap();
        assert!(timestamp >= before - chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn blank_instrument_is_rejected() {
        let (status, _) =
            get_json(state(PriceStore::new()), "/instruments/%20/latest-price").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
