//! Tiingo Feed Client
//!
//! Maintains one upstream WebSocket session for a Tiingo feed (crypto or
//! forex), turns data frames into ticks and hands them to the
//! [`TickDispatcher`].
//!
//! # Stream URLs
//!
//! - Crypto: `wss://api.tiingo.com/crypto`
//! - Forex: `wss://api.tiingo.com/fx`
//!
//! # Session
//!
//! 1. Connect
//! 2. Send the subscribe frame for the configured tickers
//! 3. Read frames until close, error, idle timeout or cancellation
//!
//! Any session failure is followed by a backoff sleep and a full new session,
//! subscribe frame included. Only cancellation ends [`FeedClient::run`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, FeedKind, FrameOutcome, TiingoCodec};
use super::messages::SubscribeRequest;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, FeedState};
use crate::application::services::TickDispatcher;
use crate::domain::streaming::InstrumentSymbol;
use crate::infrastructure::config::{ApiToken, GatewayConfig};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one upstream session.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket connect, read or write failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Upstream sent a close frame.
    #[error("connection closed by upstream")]
    ConnectionClosed,

    /// Read half ended without a close frame.
    #[error("WebSocket stream ended")]
    StreamEnded,

    /// No frame arrived within the idle limit.
    #[error("no frame received for {}s", .0.as_secs())]
    IdleTimeout(Duration),

    /// Connect or subscribe did not finish within the idle limit.
    #[error("connect and subscribe did not finish within {}s", .0.as_secs())]
    ConnectTimeout(Duration),

    /// Subscribe frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Feed family.
    pub kind: FeedKind,
    /// WebSocket URL.
    pub url: String,
    /// API token.
    pub token: ApiToken,
    /// Instruments to subscribe to.
    pub tickers: Vec<InstrumentSymbol>,
    /// Upstream update threshold.
    pub threshold_level: u32,
    /// Backoff between sessions.
    pub reconnect: ReconnectConfig,
    /// Longest silence tolerated before the session is dropped.
    pub idle_timeout: Option<Duration>,
}

impl FeedClientConfig {
    /// Create a configuration with default threshold, backoff and idle limit.
    #[must_use]
    pub fn new(
        kind: FeedKind,
        url: impl Into<String>,
        token: ApiToken,
        tickers: Vec<InstrumentSymbol>,
    ) -> Self {
        Self {
            kind,
            url: url.into(),
            token,
            tickers,
            threshold_level: 5,
            reconnect: ReconnectConfig::default(),
            idle_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Build the configuration for `kind` from the gateway configuration.
    #[must_use]
    pub fn from_gateway(kind: FeedKind, config: &GatewayConfig) -> Self {
        let (url, tickers) = match kind {
            FeedKind::Crypto => (&config.feeds.crypto_url, &config.feeds.crypto_tickers),
            FeedKind::Forex => (&config.feeds.forex_url, &config.feeds.forex_tickers),
        };

        Self {
            kind,
            url: url.clone(),
            token: config.token.clone(),
            tickers: tickers.clone(),
            threshold_level: config.feeds.threshold_level,
            reconnect: ReconnectConfig::from(&config.websocket),
            idle_timeout: config.websocket.idle_timeout,
        }
    }

    /// Subscribe frame for this feed.
    #[must_use]
    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest::subscribe(
            self.token.expose(),
            self.threshold_level,
            self.tickers.clone(),
        )
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// WebSocket client for one Tiingo feed.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: TiingoCodec,
    dispatcher: TickDispatcher,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        dispatcher: TickDispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            codec: TiingoCodec::new(config.kind),
            state: Arc::new(FeedState::new(config.kind)),
            config,
            dispatcher,
            cancel,
        }
    }

    /// Shared connection state, for health reporting.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run sessions until cancelled.
    ///
    /// Every failure is logged and retried after a backoff; nothing short of
    /// cancellation makes this return.
    pub async fn run(self: Arc<Self>) {
        let feed = self.config.kind.as_str();
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.set_state(ConnectionState::Connecting);

            match self.connect_and_run(&mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(feed, error = %e, "Feed session ended");

                    self.state.set_state(ConnectionState::Reconnecting);
                    self.state.record_reconnect();

                    let delay = policy.next_delay();
                    tracing::info!(
                        feed,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to feed"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.state.set_state(ConnectionState::Disconnected);
        tracing::info!(feed, "Feed client stopped");
    }

    /// One session. `Ok(())` means cancelled.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedClientError> {
        let feed = self.config.kind.as_str();
        tracing::info!(feed, url = %self.config.url, "Connecting to feed");

        let subscribe = self.codec.encode_subscribe(&self.config.subscribe_request())?;
        let idle_timeout = self.config.idle_timeout;

        let handshake = async {
            let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
            let (mut write, read) = ws_stream.split();
            write.send(Message::Text(subscribe.into())).await?;
            Ok::<_, FeedClientError>((write, read))
        };
        let bounded = async {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, handshake)
                    .await
                    .unwrap_or_else(|_| Err(FeedClientError::ConnectTimeout(limit))),
                None => handshake.await,
            }
        };

        let (mut write, mut read) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = bounded => result?,
        };

        self.state.set_state(ConnectionState::Connected);
        tracing::info!(
            feed,
            tickers = self.config.tickers.len(),
            "Feed connected and subscribed"
        );

        let mut delivered_tick = false;

        loop {
            let next = async {
                match idle_timeout {
                    Some(limit) => tokio::time::timeout(limit, read.next())
                        .await
                        .map_err(|_| FeedClientError::IdleTimeout(limit)),
                    None => Ok(read.next().await),
                }
            };

            let frame = tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = next => frame?,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => Some(text.to_string()),
                Some(Ok(Message::Binary(data))) => String::from_utf8(data.to_vec()).ok(),
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                    None
                }
                Some(Ok(Message::Close(_))) => return Err(FeedClientError::ConnectionClosed),
                Some(Ok(_)) => None,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(FeedClientError::StreamEnded),
            };

            // Backoff resets on the first decoded tick, never on control or error frames.
            let ticked = text.is_some_and(|text| self.handle_text(&text));
            if ticked && !delivered_tick {
                delivered_tick = true;
                policy.reset();
                self.state.clear_reconnects();
            }
        }
    }

    /// Decode and route one frame. Returns whether it carried a tick.
    fn handle_text(&self, text: &str) -> bool {
        let feed = self.config.kind.as_str();
        self.state.record_frame();

        match self.codec.decode(text) {
            Ok(FrameOutcome::Tick(tick)) => {
                self.state.record_tick(Utc::now());
                tracing::trace!(
                    feed,
                    instrument = %tick.instrument(),
                    price = %tick.price(),
                    "Tick decoded"
                );
                self.dispatcher.dispatch(tick);
                return true;
            }
            Ok(FrameOutcome::Heartbeat) => {
                tracing::trace!(feed, "Heartbeat");
            }
            Ok(FrameOutcome::Control(status)) => {
                tracing::debug!(
                    feed,
                    status = %status.unwrap_or_default(),
                    "Control frame"
                );
            }
            Ok(FrameOutcome::UpstreamError(status)) => {
                tracing::warn!(feed, status = %status, "Upstream reported an error");
            }
            Err(e) => {
                self.state.record_decode_error();
                tracing::warn!(feed, error = %e, "Discarding undecodable frame");
                tracing::debug!(feed, frame = text, "Undecodable frame");
            }
        }
        false
    }
}
