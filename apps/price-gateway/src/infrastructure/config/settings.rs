//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::streaming::InstrumentSymbol;

/// Tiingo API token.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Get the token text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiToken").field(&"[REDACTED]").finish()
    }
}

/// Upstream feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Crypto feed WebSocket URL.
    pub crypto_url: String,
    /// Forex feed WebSocket URL.
    pub forex_url: String,
    /// Crypto instruments to subscribe to.
    pub crypto_tickers: Vec<InstrumentSymbol>,
    /// Forex instruments to subscribe to.
    pub forex_tickers: Vec<InstrumentSymbol>,
    /// Upstream update threshold level sent in the subscribe frame.
    pub threshold_level: u32,
}

impl FeedSettings {
    /// Every configured instrument across both feeds.
    #[must_use]
    pub fn all_tickers(&self) -> Vec<InstrumentSymbol> {
        self.crypto_tickers
            .iter()
            .chain(&self.forex_tickers)
            .cloned()
            .collect()
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            crypto_url: "wss://api.tiingo.com/crypto".to_string(),
            forex_url: "wss://api.tiingo.com/fx".to_string(),
            crypto_tickers: parse_tickers("xrpusdt,dogeusdt,btcusdt"),
            forex_tickers: parse_tickers("eurusd,jpyusd"),
            threshold_level: 5,
        }
    }
}

/// Upstream WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Upstream silence after which the session is recycled (`None` = never).
    pub idle_timeout: Option<Duration>,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            idle_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Fan-out settings.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    /// Subscribers sent to concurrently per batch.
    pub batch_size: usize,
    /// Per-send timeout (`None` = wait indefinitely).
    pub send_timeout: Option<Duration>,
    /// Number of publish workers.
    pub publish_workers: usize,
    /// Queue capacity per publish worker.
    pub publish_queue_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            send_timeout: Some(Duration::from_secs(5)),
            publish_workers: 4,
            publish_queue_capacity: 4096,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP port serving `/ws`, snapshot queries, health and metrics.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Tiingo API token.
    pub token: ApiToken,
    /// Upstream feed settings.
    pub feeds: FeedSettings,
    /// Upstream WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Fan-out settings.
    pub broadcast: BroadcastSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// ticker list is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or a ticker list
    /// is empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("TIINGO_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("TIINGO_TOKEN".to_string()))?;

        if token.trim().is_empty() {
            return Err(ConfigError::EmptyValue("TIINGO_TOKEN".to_string()));
        }

        let feed_defaults = FeedSettings::default();
        let feeds = FeedSettings {
            crypto_url: lookup("TIINGO_CRYPTO_WS_URI").unwrap_or(feed_defaults.crypto_url),
            forex_url: lookup("TIINGO_FX_WS_URI").unwrap_or(feed_defaults.forex_url),
            crypto_tickers: tickers_or(
                &lookup,
                "GATEWAY_CRYPTO_TICKERS",
                feed_defaults.crypto_tickers,
            )?,
            forex_tickers: tickers_or(
                &lookup,
                "GATEWAY_FOREX_TICKERS",
                feed_defaults.forex_tickers,
            )?,
            threshold_level: parse_env(&lookup, "GATEWAY_THRESHOLD_LEVEL")
                .unwrap_or(feed_defaults.threshold_level),
        };

        let ws_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            reconnect_delay_initial: parse_env(&lookup, "GATEWAY_RECONNECT_DELAY_INITIAL_MS")
                .map_or(ws_defaults.reconnect_delay_initial, Duration::from_millis),
            reconnect_delay_max: parse_env(&lookup, "GATEWAY_RECONNECT_DELAY_MAX_SECS")
                .map_or(ws_defaults.reconnect_delay_max, Duration::from_secs),
            reconnect_delay_multiplier: parse_env(&lookup, "GATEWAY_RECONNECT_DELAY_MULTIPLIER")
                .unwrap_or(ws_defaults.reconnect_delay_multiplier),
            idle_timeout: parse_env(&lookup, "GATEWAY_FEED_IDLE_TIMEOUT_SECS")
                .map_or(ws_defaults.idle_timeout, |secs: u64| {
                    (secs > 0).then(|| Duration::from_secs(secs))
                }),
        };

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            batch_size: parse_env(&lookup, "GATEWAY_BROADCAST_BATCH_SIZE")
                .unwrap_or(broadcast_defaults.batch_size)
                .max(1),
            send_timeout: parse_env(&lookup, "GATEWAY_SEND_TIMEOUT_MS")
                .map_or(broadcast_defaults.send_timeout, |ms: u64| {
                    (ms > 0).then(|| Duration::from_millis(ms))
                }),
            publish_workers: parse_env(&lookup, "GATEWAY_PUBLISH_WORKERS")
                .unwrap_or(broadcast_defaults.publish_workers)
                .max(1),
            publish_queue_capacity: parse_env(&lookup, "GATEWAY_PUBLISH_QUEUE_CAPACITY")
                .unwrap_or(broadcast_defaults.publish_queue_capacity)
                .max(1),
        };

        let server = ServerSettings {
            http_port: parse_env(&lookup, "GATEWAY_HTTP_PORT")
                .unwrap_or(ServerSettings::default().http_port),
        };

        Ok(Self {
            token: ApiToken::new(token),
            feeds,
            websocket,
            broadcast,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A ticker list contains no usable symbols.
    #[error("environment variable {0} contains no instrument symbols")]
    NoTickers(String),
}

/// Parse `key` as `T`; `None` when unset or invalid.
fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn tickers_or<F>(
    lookup: &F,
    key: &str,
    default: Vec<InstrumentSymbol>,
) -> Result<Vec<InstrumentSymbol>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };

    let tickers = parse_tickers(&raw);
    if tickers.is_empty() {
        return Err(ConfigError::NoTickers(key.to_string()));
    }
    Ok(tickers)
}

fn parse_tickers(raw: &str) -> Vec<InstrumentSymbol> {
    let mut tickers: Vec<InstrumentSymbol> = Vec::new();
    for symbol in raw.split(',').filter_map(InstrumentSymbol::parse) {
        if !tickers.contains(&symbol) {
            tickers.push(symbol);
        }
    }
    tickers
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_token() {
        let config = config_from(&[("TIINGO_TOKEN", "abc")]).unwrap();

        assert_eq!(config.token.expose(), "abc");
        assert_eq!(config.feeds.crypto_url, "wss://api.tiingo.com/crypto");
        assert_eq!(config.feeds.forex_url, "wss://api.tiingo.com/fx");
        assert_eq!(
            config
                .feeds
                .crypto_tickers
                .iter()
                .map(InstrumentSymbol::as_str)
                .collect::<Vec<_>>(),
            vec!["xrpusdt", "dogeusdt", "btcusdt"]
        );
        assert_eq!(config.feeds.forex_tickers.len(), 2);
        assert_eq!(config.feeds.threshold_level, 5);
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.broadcast.batch_size, 100);
        assert_eq!(config.broadcast.send_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.websocket.idle_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn missing_token_is_error() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::MissingEnvVar(key)) if key == "TIINGO_TOKEN"
        ));
    }

    #[test]
    fn blank_token_is_error() {
        assert!(matches!(
            config_from(&[("TIINGO_TOKEN", "  ")]),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn ticker_lists_are_normalized_and_deduplicated() {
        let config = config_from(&[
            ("TIINGO_TOKEN", "abc"),
            ("GATEWAY_CRYPTO_TICKERS", " BTCUSDT, ethusdt,,btcusdt "),
        ])
        .unwrap();

        assert_eq!(
            config
                .feeds
                .crypto_tickers
                .iter()
                .map(InstrumentSymbol::as_str)
                .collect::<Vec<_>>(),
            vec!["btcusdt", "ethusdt"]
        );
    }

    #[test]
    fn empty_ticker_list_is_error() {
        assert!(matches!(
            config_from(&[("TIINGO_TOKEN", "abc"), ("GATEWAY_FOREX_TICKERS", " , ")]),
            Err(ConfigError::NoTickers(key)) if key == "GATEWAY_FOREX_TICKERS"
        ));
    }

    #[test_case("GATEWAY_SEND_TIMEOUT_MS", "0" ; "send timeout")]
    #[test_case("GATEWAY_FEED_IDLE_TIMEOUT_SECS", "0" ; "idle timeout")]
    fn zero_disables_timeouts(key: &str, value: &str) {
        let config = config_from(&[("TIINGO_TOKEN", "abc"), (key, value)]).unwrap();

        match key {
            "GATEWAY_SEND_TIMEOUT_MS" => assert_eq!(config.broadcast.send_timeout, None),
            _ => assert_eq!(config.websocket.idle_timeout, None),
        }
    }

    #[test_case("GATEWAY_BROADCAST_BATCH_SIZE", "0", 1 ; "batch size floor")]
    #[test_case("GATEWAY_BROADCAST_BATCH_SIZE", "25", 25 ; "batch size override")]
    #[test_case("GATEWAY_BROADCAST_BATCH_SIZE", "many", 100 ; "batch size invalid")]
    fn batch_size_parsing(key: &str, value: &str, expected: usize) {
        let config = config_from(&[("TIINGO_TOKEN", "abc"), (key, value)]).unwrap();
        assert_eq!(config.broadcast.batch_size, expected);
    }

    #[test]
    fn reconnect_overrides() {
        let config = config_from(&[
            ("TIINGO_TOKEN", "abc"),
            ("GATEWAY_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("GATEWAY_RECONNECT_DELAY_MAX_SECS", "10"),
            ("GATEWAY_RECONNECT_DELAY_MULTIPLIER", "1.5"),
        ])
        .unwrap();

        assert_eq!(
            config.websocket.reconnect_delay_initial,
            Duration::from_millis(250)
        );
        assert_eq!(config.websocket.reconnect_delay_max, Duration::from_secs(10));
        assert!((config.websocket.reconnect_delay_multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn token_redacted_debug() {
        let token = ApiToken::new("secret-token".to_string());
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn all_tickers_spans_both_feeds() {
        assert_eq!(FeedSettings::default().all_tickers().len(), 5);
    }
}
