//! Tiingo WebSocket Message Types
//!
//! Wire format types for the Tiingo crypto and forex streams.
//!
//! # Outbound
//!
//! - `SubscribeRequest`: sent once per session right after connecting
//!
//! # Inbound
//!
//! Every frame is a JSON object with a `messageType`:
//!
//! - `A`: data update; `data` is a positional array
//! - `I`: informational (subscription confirmation)
//! - `H`: heartbeat
//! - `E`: error, details in `response`
//!
//! # References
//!
//! - [Crypto](https://www.tiingo.com/documentation/websockets/crypto)
//! - [Forex](https://www.tiingo.com/documentation/websockets/forex)

use serde::{Deserialize, Serialize};

use crate::domain::streaming::InstrumentSymbol;

// =============================================================================
// Outbound
// =============================================================================

/// Subscribe control frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Always `subscribe`.
    pub event_name: &'static str,
    /// API token.
    pub authorization: String,
    /// Subscription parameters.
    pub event_data: SubscribeEventData,
}

/// Parameters of a [`SubscribeRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeEventData {
    /// Update threshold level.
    pub threshold_level: u32,
    /// Instruments to stream.
    pub tickers: Vec<InstrumentSymbol>,
}

impl SubscribeRequest {
    /// Create a subscribe request.
    #[must_use]
    pub fn subscribe(token: &str, threshold_level: u32, tickers: Vec<InstrumentSymbol>) -> Self {
        Self {
            event_name: "subscribe",
            authorization: token.to_string(),
            event_data: SubscribeEventData {
                threshold_level,
                tickers,
            },
        }
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Top-level inbound frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Frame kind (`A`, `I`, `H`, `E`).
    #[serde(default)]
    pub message_type: Option<String>,
    /// Service name (`crypto_data`, `fx`).
    #[serde(default)]
    pub service: Option<String>,
    /// Payload; a positional array for data updates.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Status block on control frames.
    #[serde(default)]
    pub response: Option<ResponseStatus>,
}

/// Status block carried by heartbeat, info and error frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseStatus {
    /// Status code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.message.as_deref()) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => write!(f, "{code}"),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("no details"),
        }
    }
}
