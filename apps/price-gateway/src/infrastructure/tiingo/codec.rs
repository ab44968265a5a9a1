//! Tiingo Frame Codec
//!
//! Decodes inbound Tiingo frames into normalized [`PriceTick`]s.
//!
//! Data updates carry a positional array whose layout depends on the feed:
//!
//! ```text
//! crypto: ["T", ticker, timestamp, exchange, volume, lastPrice]
//! forex:  ["Q", ticker, timestamp, bidSize, bidPrice, midPrice, askSize, askPrice]
//! ```
//!
//! The price of record is `lastPrice` for crypto and `askPrice` for forex.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use super::messages::{Envelope, ResponseStatus, SubscribeRequest};
use crate::domain::streaming::{InstrumentSymbol, PriceTick, TickError};
use crate::infrastructure::metrics::FeedLabel;

const TICKER_INDEX: usize = 1;
const TIMESTAMP_INDEX: usize = 2;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data array is shorter than the feed layout requires.
    #[error("data array has {actual} elements, expected at least {expected}")]
    TooShort {
        /// Required length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// Update type is not the one this feed streams.
    #[error("unexpected update type {0:?}")]
    UnexpectedUpdateType(String),

    /// An element has the wrong JSON type or an unusable value.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The decoded price was rejected.
    #[error(transparent)]
    Tick(#[from] TickError),
}

/// Upstream feed family, which fixes the data array layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Crypto top-of-book trades.
    Crypto,
    /// Forex quotes.
    Forex,
}

impl FeedKind {
    /// Update type marker in element 0.
    #[must_use]
    pub const fn update_type(self) -> &'static str {
        match self {
            Self::Crypto => "T",
            Self::Forex => "Q",
        }
    }

    /// Array index of the price of record.
    #[must_use]
    pub const fn price_index(self) -> usize {
        match self {
            Self::Crypto => 5,
            Self::Forex => 7,
        }
    }

    /// Short name for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.label().as_str()
    }

    /// Metrics label.
    #[must_use]
    pub const fn label(self) -> FeedLabel {
        match self {
            Self::Crypto => FeedLabel::Crypto,
            Self::Forex => FeedLabel::Forex,
        }
    }
}

/// Classification of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A normalized price update.
    Tick(PriceTick),
    /// Keep-alive.
    Heartbeat,
    /// Informational or other non-data frame.
    Control(Option<ResponseStatus>),
    /// Upstream reported an error.
    UpstreamError(ResponseStatus),
}

/// JSON codec for one Tiingo feed.
#[derive(Debug, Clone, Copy)]
pub struct TiingoCodec {
    kind: FeedKind,
}

impl TiingoCodec {
    /// Create a codec for `kind`.
    #[must_use]
    pub const fn new(kind: FeedKind) -> Self {
        Self { kind }
    }

    /// Feed family this codec decodes.
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Classify and decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON or a data array does not
    /// match the feed layout.
    pub fn decode(&self, text: &str) -> Result<FrameOutcome, CodecError> {
        let envelope: Envelope = serde_json::from_str(text)?;

        if let Some(Value::Array(data)) = &envelope.data {
            return self.decode_data(data).map(FrameOutcome::Tick);
        }

        let outcome = match envelope.message_type.as_deref() {
            Some("H") => FrameOutcome::Heartbeat,
            Some("E") => FrameOutcome::UpstreamError(envelope.response.unwrap_or_default()),
            _ => FrameOutcome::Control(envelope.response),
        };
        Ok(outcome)
    }

    /// Encode the subscribe control frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_subscribe(&self, request: &SubscribeRequest) -> Result<String, CodecError> {
        Ok(serde_json::to_string(request)?)
    }

    fn decode_data(&self, data: &[Value]) -> Result<PriceTick, CodecError> {
        let expected = self.kind.price_index() + 1;
        if data.len() < expected {
            return Err(CodecError::TooShort {
                expected,
                actual: data.len(),
            });
        }

        let update_type = data[0].as_str().unwrap_or_default();
        if update_type != self.kind.update_type() {
            return Err(CodecError::UnexpectedUpdateType(data[0].to_string()));
        }

        let instrument = data[TICKER_INDEX]
            .as_str()
            .and_then(InstrumentSymbol::parse)
            .ok_or_else(|| invalid("ticker", "expected a non-empty string"))?;

        let timestamp = data[TIMESTAMP_INDEX]
            .as_str()
            .ok_or_else(|| invalid("timestamp", "expected a string"))
            .and_then(parse_timestamp)?;

        let price = parse_decimal(&data[self.kind.price_index()])?;

        Ok(PriceTick::new(instrument, price, timestamp)?)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| invalid("timestamp", format!("{raw:?}: {e}")))
}

/// Parse a JSON number into a decimal without going through `f64`, so the
/// upstream digits are kept exactly.
fn parse_decimal(value: &Value) -> Result<Decimal, CodecError> {
    let Value::Number(number) = value else {
        return Err(invalid("price", format!("expected a number, got {value}")));
    };

    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| invalid("price", format!("{text}: {e}")))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;

    fn ts(secs: u32, millis: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 28, 18, 46, secs).unwrap()
            + chrono::Duration::milliseconds(millis)
    }

    #[test]
    fn decodes_crypto_update() {
        let codec = TiingoCodec::new(FeedKind::Crypto);
        let frame = r#"{"service":"crypto_data","messageType":"A","data":["T","xrpusdt","2025-02-28T18:46:38.675000+00:00","binance",6080.0,2.1467452467105277]}"#;

        let FrameOutcome::Tick(tick) = codec.decode(frame).unwrap() else {
            panic!("expected tick");
        };

        assert_eq!(tick.instrument().as_str(), "xrpusdt");
        assert_eq!(tick.price(), Decimal::from_str("2.1467452467105277").unwrap());
        assert_eq!(tick.timestamp(), ts(38, 675));
    }

    #[test]
    fn decodes_forex_update() {
        let codec = TiingoCodec::new(FeedKind::Forex);
        let frame = r#"{"data":["Q","eurusd","2023-06-14T14:25:50.432000+00:00",1000000.0,1.0847,1.084745,1000000.0,1.08479]}"#;

        let FrameOutcome::Tick(tick) = codec.decode(frame).unwrap() else {
            panic!("expected tick");
        };

        assert_eq!(tick.instrument().as_str(), "eurusd");
        assert_eq!(tick.price(), Decimal::from_str("1.08479").unwrap());
        assert_eq!(
            tick.timestamp(),
            Utc.with_ymd_and_hms(2023, 6, 14, 14, 25, 50).unwrap()
                + chrono::Duration::milliseconds(432)
        );
    }

    #[test]
    fn ticker_is_normalized() {
        let codec = TiingoCodec::new(FeedKind::Crypto);
        let frame = r#"{"data":["T","BTCUSDT","2025-02-28T18:46:38.675000+00:00","binance",1.0,84250.5]}"#;

        let FrameOutcome::Tick(tick) = codec.decode(frame).unwrap() else {
            panic!("expected tick");
        };
        assert_eq!(tick.instrument().as_str(), "btcusdt");
    }

    #[test_case(r#"{"messageType":"H","response":{"code":200,"message":"HeartBeat"}}"#, FrameOutcome::Heartbeat ; "heartbeat")]
    #[test_case(r#"{"messageType":"I","data":{"subscriptionId":61}}"#, FrameOutcome::Control(None) ; "info with object data")]
    fn classifies_control_frames(frame: &str, expected: FrameOutcome) {
        let codec = TiingoCodec::new(FeedKind::Crypto);
        assert_eq!(codec.decode(frame).unwrap(), expected);
    }

    #[test]
    fn classifies_upstream_error() {
        let codec = TiingoCodec::new(FeedKind::Forex);
        let outcome = codec
            .decode(r#"{"messageType":"E","response":{"code":401,"message":"Unauthorized"}}"#)
            .unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::UpstreamError(ResponseStatus {
                code: Some(401),
                message: Some("Unauthorized".to_string()),
            })
        );
    }

    #[test_case(FeedKind::Crypto, "not json" ; "not json")]
    #[test_case(FeedKind::Crypto, r#"{"data":["T","xrpusdt","2025-02-28T18:46:38.675000+00:00"]}"# ; "too short")]
    #[test_case(FeedKind::Crypto, r#"{"data":["Q","xrpusdt","2025-02-28T18:46:38.675000+00:00","binance",1.0,2.0]}"# ; "wrong update type")]
    #[test_case(FeedKind::Crypto, r#"{"data":["T",42,"2025-02-28T18:46:38.675000+00:00","binance",1.0,2.0]}"# ; "ticker not string")]
    #[test_case(FeedKind::Crypto, r#"{"data":["T","xrpusdt","yesterday","binance",1.0,2.0]}"# ; "bad timestamp")]
    #[test_case(FeedKind::Crypto, r#"{"data":["T","xrpusdt","2025-02-28T18:46:38.675000+00:00","binance",1.0,"2.0"]}"# ; "price not number")]
    #[test_case(FeedKind::Crypto, r#"{"data":["T","xrpusdt","2025-02-28T18:46:38.675000+00:00","binance",1.0,-2.0]}"# ; "negative price")]
    #[test_case(FeedKind::Forex, r#"{"data":["Q","eurusd","2023-06-14T14:25:50.432000+00:00",1000000.0,1.0847,1.084745,1000000.0]}"# ; "forex missing ask")]
    fn rejects_malformed_frames(kind: FeedKind, frame: &str) {
        assert!(TiingoCodec::new(kind).decode(frame).is_err());
    }

    #[test]
    fn negative_price_is_tick_error() {
        let codec = TiingoCodec::new(FeedKind::Crypto);
        let result = codec.decode(
            r#"{"data":["T","xrpusdt","2025-02-28T18:46:38.675000+00:00","binance",1.0,-2.0]}"#,
        );
        assert!(matches!(result, Err(CodecError::Tick(_))));
    }

    #[test]
    fn scientific_notation_price() {
        let codec = TiingoCodec::new(FeedKind::Crypto);
        let frame = r#"{"data":["T","shibusdt","2025-02-28T18:46:38.675000+00:00","binance",1.0,1.5e-5]}"#;

        let FrameOutcome::Tick(tick) = codec.decode(frame).unwrap() else {
            panic!("expected tick");
        };
        assert_eq!(tick.price(), Decimal::from_str("0.000015").unwrap());
    }
}
