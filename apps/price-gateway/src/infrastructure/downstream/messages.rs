//! Downstream Wire Messages
//!
//! JSON messages exchanged with subscribers on the `/ws` channel.
//!
//! # Client → Server
//!
//! ```json
//! {"action": "subscribe", "instruments": ["btcusdt", "xrpusdt"]}
//! {"action": "unsubscribe", "instruments": ["btcusdt"]}
//! ```
//!
//! # Server → Client
//!
//! ```json
//! {"instrument": "btcusdt", "price": 84250.5, "timestamp": "2025-02-28T18:46:38.675Z"}
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{InstrumentSymbol, PriceTick};
use crate::domain::subscription::SubscriptionAction;

/// Errors raised by malformed client control messages.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Message is not JSON or lacks `action` / `instruments`.
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `action` is neither `subscribe` nor `unsubscribe`.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

#[derive(Debug, Deserialize)]
struct RawControlMessage {
    action: String,
    instruments: Vec<String>,
}

/// A parsed client control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    /// Requested action.
    pub action: SubscriptionAction,
    /// Raw instrument names as sent; blank entries are still present here.
    pub instruments: Vec<String>,
}

impl ControlRequest {
    /// Parse a control message from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] if the text is not a JSON object with a
    /// string `action` and an array-of-strings `instruments`, or if the
    /// action is unknown.
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let raw: RawControlMessage = serde_json::from_str(text)?;
        let action = SubscriptionAction::from_str_case_insensitive(&raw.action)
            .ok_or(ControlError::UnknownAction(raw.action))?;

        Ok(Self {
            action,
            instruments: raw.instruments,
        })
    }
}

/// Price update pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceUpdateMessage {
    /// Instrument symbol.
    pub instrument: InstrumentSymbol,
    /// Price of record, serialized as a JSON number.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Upstream observation time.
    pub timestamp: DateTime<Utc>,
}

impl PriceUpdateMessage {
    /// Encode to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&PriceTick> for PriceUpdateMessage {
    fn from(tick: &PriceTick) -> Self {
        Self {
            instrument: tick.instrument().clone(),
            price: tick.price(),
            timestamp: tick.timestamp(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
