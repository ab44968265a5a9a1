//! Market Data Streaming Types
//!
//! Core domain types for price data: instrument symbols and price ticks.
//! These types are codec-agnostic and represent the canonical internal
//! representation every feed is normalized into.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Instrument Symbol
// =============================================================================

/// Case-normalized instrument identifier (e.g. `btcusdt`, `eurusd`).
///
/// Symbols are trimmed and lowercased on construction, so two symbols that
/// differ only in case or surrounding whitespace compare equal and hash to
/// the same key in every map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct InstrumentSymbol(String);

/// Rejected symbol text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("instrument symbol must not be blank")]
pub struct BlankSymbol;

impl InstrumentSymbol {
    /// Parse a symbol, returning `None` for empty or whitespace-only input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_lowercase()))
        }
    }

    /// Borrow the normalized symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InstrumentSymbol {
    type Error = BlankSymbol;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or(BlankSymbol)
    }
}

impl From<InstrumentSymbol> for String {
    fn from(symbol: InstrumentSymbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for InstrumentSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for InstrumentSymbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for InstrumentSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Price Tick
// =============================================================================

/// Errors raised while constructing a [`PriceTick`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    /// Prices of record are never negative.
    #[error("negative price {price} for {instrument}")]
    NegativePrice {
        /// Instrument the price was reported for.
        instrument: InstrumentSymbol,
        /// The rejected price.
        price: Decimal,
    },
}

/// One normalized price observation for an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    instrument: InstrumentSymbol,
    price: Decimal,
    timestamp: DateTime<Utc>,
}

impl PriceTick {
    /// Create a tick, rejecting negative prices.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::NegativePrice`] when `price` is below zero.
    pub fn new(
        instrument: InstrumentSymbol,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TickError> {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(TickError::NegativePrice { instrument, price });
        }

        Ok(Self {
            instrument,
            price,
            timestamp,
        })
    }

    /// Zero-price placeholder stamped with the current time.
    ///
    /// Used both for seeding known instruments and as the answer for
    /// instruments that have never been priced.
    #[must_use]
    pub fn placeholder(instrument: InstrumentSymbol) -> Self {
        Self {
            instrument,
            price: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    /// Instrument this tick prices.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentSymbol {
        &self.instrument
    }

    /// Price of record.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Time the price was observed upstream.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Re-key the tick under another symbol, keeping price and timestamp.
    #[must_use]
    pub fn with_instrument(self, instrument: InstrumentSymbol) -> Self {
        Self { instrument, ..self }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn symbol_is_lowercased_and_trimmed() {
        let symbol = InstrumentSymbol::parse("  BTCUSDT ").unwrap();
        assert_eq!(symbol.as_str(), "btcusdt");
        assert_eq!(symbol, InstrumentSymbol::parse("btcusdt").unwrap());
    }

    #[test]
    fn blank_symbols_are_rejected() {
        assert!(InstrumentSymbol::parse("").is_none());
        assert!(InstrumentSymbol::parse("   ").is_none());
        assert!(InstrumentSymbol::parse("\t\n").is_none());
    }

    #[test]
    fn symbol_serializes_as_plain_string() {
        let symbol = InstrumentSymbol::parse("EurUsd").unwrap();
        assert_eq!(serde_json::to_string(&symbol).unwrap(), "\"eurusd\"");
    }

    #[test]
    fn symbol_deserializes_normalized() {
        let symbol: InstrumentSymbol = serde_json::from_str("\" BTCUSDT\"").unwrap();
        assert_eq!(symbol.as_str(), "btcusdt");

        assert!(serde_json::from_str::<InstrumentSymbol>("\"  \"").is_err());
    }

    #[test]
    fn negative_price_is_rejected() {
        let symbol = InstrumentSymbol::parse("xrpusdt").unwrap();
        let result = PriceTick::new(symbol, Decimal::from_str("-0.01").unwrap(), Utc::now());
        assert!(matches!(result, Err(TickError::NegativePrice { .. })));
    }

    #[test]
    fn zero_price_is_accepted() {
        let symbol = InstrumentSymbol::parse("xrpusdt").unwrap();
        let tick = PriceTick::new(symbol, Decimal::ZERO, Utc::now()).unwrap();
        assert!(tick.price().is_zero());
    }

    #[test]
    fn placeholder_is_zero_and_recent() {
        let before = Utc::now();
        let tick = PriceTick::placeholder(InstrumentSymbol::parse("btcusdt").unwrap());
        assert!(tick.price().is_zero());
        assert!(tick.timestamp() >= before);
        assert!(tick.timestamp() <= Utc::now());
    }

    proptest! {
        #[test]
        fn parse_is_case_insensitive(raw in "[a-zA-Z]{1,12}") {
            let upper = InstrumentSymbol::parse(&raw.to_uppercase());
            let lower = InstrumentSymbol::parse(&raw.to_lowercase());
            prop_assert_eq!(upper, lower);
        }

        #[test]
        fn parse_is_idempotent(raw in "[ a-zA-Z0-9]{0,16}") {
            if let Some(symbol) = InstrumentSymbol::parse(&raw) {
                let again = InstrumentSymbol::parse(symbol.as_str());
                prop_assert_eq!(Some(symbol), again);
            }
        }
    }
}
