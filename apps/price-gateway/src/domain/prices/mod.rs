//! Latest Price Store
//!
//! Concurrent latest-value cache keyed by instrument symbol. Holds exactly
//! one tick per instrument and no history.
//!
//! # Ordering Policy
//!
//! Upserts are last-writer-wins: a tick always replaces whatever is stored,
//! even when its timestamp is older than the stored one. Per-instrument
//! ordering is the feed's responsibility (ticks are upserted in decode order
//! by a single ingestion task per feed).

use std::sync::Arc;

use dashmap::DashMap;

use super::streaming::{InstrumentSymbol, PriceTick};

/// Concurrent instrument → latest tick cache.
///
/// Every operation locks a single shard of the underlying map, so writers
/// for unrelated instruments never serialize behind one another.
#[derive(Debug, Default)]
pub struct PriceStore {
    prices: DashMap<InstrumentSymbol, PriceTick>,
}

/// Shared price store reference.
pub type SharedPriceStore = Arc<PriceStore>;

impl PriceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a zero-price placeholder per instrument.
    #[must_use]
    pub fn seeded<I>(instruments: I) -> Self
    where
        I: IntoIterator<Item = InstrumentSymbol>,
    {
        let store = Self::new();
        for instrument in instruments {
            store
                .prices
                .entry(instrument.clone())
                .or_insert_with(|| PriceTick::placeholder(instrument));
        }
        store
    }

    /// All currently tracked instruments, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<InstrumentSymbol> {
        let mut symbols: Vec<_> = self.prices.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Latest tick for `symbol`.
    ///
    /// Unknown instruments yield a zero-price tick stamped with the current
    /// time rather than an error.
    #[must_use]
    pub fn latest(&self, symbol: &InstrumentSymbol) -> PriceTick {
        self.prices
            .get(symbol)
            .map_or_else(|| PriceTick::placeholder(symbol.clone()), |tick| tick.value().clone())
    }

    /// Store `tick` as the latest price for `symbol`, replacing any previous
    /// value unconditionally.
    ///
    /// The stored tick is re-keyed to `symbol`, so a later lookup in any
    /// casing returns the same tick.
    pub fn upsert(&self, symbol: &InstrumentSymbol, tick: PriceTick) {
        let tick = if tick.instrument() == symbol {
            tick
        } else {
            tick.with_instrument(symbol.clone())
        };
        self.prices.insert(symbol.clone(), tick);
    }

    /// Number of tracked instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no instruments are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;

    fn symbol(s: &str) -> InstrumentSymbol {
        InstrumentSymbol::parse(s).unwrap()
    }

    fn tick(s: &str, price: &str, secs: i64) -> PriceTick {
        PriceTick::new(
            symbol(s),
            Decimal::from_str(price).unwrap(),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn unknown_symbol_returns_zero_now() {
        let store = PriceStore::new();
        let before = Utc::now();

        let latest = store.latest(&symbol("dogeusdt"));

        assert!(latest.price().is_zero());
        assert_eq!(latest.instrument().as_str(), "dogeusdt");
        assert!(latest.timestamp() >= before - Duration::seconds(1));
        assert!(latest.timestamp() <= Utc::now() + Duration::seconds(1));
    }

    #[test]
    fn upsert_then_latest_returns_same_tick() {
        let store = PriceStore::new();
        let t = tick("xrpusdt", "2.1467452467105277", 0);

        store.upsert(&symbol("xrpusdt"), t.clone());

        assert_eq!(store.latest(&symbol("xrpusdt")), t);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let store = PriceStore::new();
        let t = tick("btcusdt", "84250.5", 0);

        store.upsert(&symbol("BTCUSDT"), t.clone());

        assert_eq!(store.latest(&symbol("btcusdt")), t);
        assert_eq!(store.latest(&symbol("BtcUsdt")), t);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn older_tick_still_overwrites_newer() {
        let store = PriceStore::new();
        let newer = tick("eurusd", "1.0850", 10);
        let older = tick("eurusd", "1.0840", 0);

        store.upsert(&symbol("eurusd"), newer);
        store.upsert(&symbol("eurusd"), older.clone());

        assert_eq!(store.latest(&symbol("eurusd")), older);
    }

    #[test]
    fn seeded_store_tracks_placeholders() {
        let store = PriceStore::seeded([symbol("btcusdt"), symbol("eurusd")]);

        assert_eq!(store.symbols(), vec![symbol("btcusdt"), symbol("eurusd")]);
        assert!(store.latest(&symbol("btcusdt")).price().is_zero());
    }

    #[test]
    fn upsert_rekeys_mismatched_tick() {
        let store = PriceStore::new();

        store.upsert(&symbol("jpyusd"), tick("other", "0.0069", 0));

        assert_eq!(store.latest(&symbol("jpyusd")).instrument().as_str(), "jpyusd");
    }

    #[test]
    fn concurrent_upserts_on_distinct_keys() {
        use std::thread;

        let store = Arc::new(PriceStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for n in 0..100 {
                        let name = format!("sym{i}");
                        store.upsert(&symbol(&name), tick(&name, &n.to_string(), n));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8);
        for i in 0..8 {
            assert_eq!(store.latest(&symbol(&format!("sym{i}"))).price(), Decimal::from(99));
        }
    }
}
