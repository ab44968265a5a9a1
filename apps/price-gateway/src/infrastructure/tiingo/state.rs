//! Feed Connection State
//!
//! Shared, lock-light view of one feed client's connection health, written
//! by the client loop and read by the health endpoint.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::codec::FeedKind;
use crate::infrastructure::metrics;

/// Connection state of one upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected and not trying.
    Disconnected,
    /// Opening the WebSocket and subscribing.
    Connecting,
    /// Session established.
    Connected,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Point-in-time copy of a [`FeedState`].
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    /// Feed name.
    pub feed: &'static str,
    /// Connection state.
    pub state: ConnectionState,
    /// Whether the feed is connected.
    pub connected: bool,
    /// Reconnect attempts since the last successful session.
    pub reconnect_attempts: u32,
    /// Frames received over the process lifetime.
    pub frames_received: u64,
    /// Ticks decoded over the process lifetime.
    pub ticks_decoded: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
    /// Time of the last decoded tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Time the current or last session was established.
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Connection state and counters for one feed client.
#[derive(Debug)]
pub struct FeedState {
    kind: FeedKind,
    state: parking_lot::RwLock<ConnectionState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_tick_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    reconnect_attempts: AtomicU32,
    frames_received: AtomicU64,
    ticks_decoded: AtomicU64,
    decode_errors: AtomicU64,
}

impl FeedState {
    /// Create a disconnected state for `kind`.
    #[must_use]
    pub const fn new(kind: FeedKind) -> Self {
        Self {
            kind,
            state: parking_lot::const_rwlock(ConnectionState::Disconnected),
            last_connected_at: parking_lot::const_rwlock(None),
            last_tick_at: parking_lot::const_rwlock(None),
            reconnect_attempts: AtomicU32::new(0),
            frames_received: AtomicU64::new(0),
            ticks_decoded: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    /// Feed family.
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
        }
        metrics::set_feed_connected(self.kind.label(), state == ConnectionState::Connected);
    }

    /// Record a reconnect attempt.
    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::record_reconnect(self.kind.label());
    }

    /// Clear the reconnect counter once a session delivers data.
    pub fn clear_reconnects(&self) {
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }

    /// Record an inbound frame.
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        metrics::record_frame_received(self.kind.label());
    }

    /// Record a decoded tick.
    pub fn record_tick(&self, at: DateTime<Utc>) {
        self.ticks_decoded.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.write() = Some(at);
        metrics::record_tick_decoded(self.kind.label());
    }

    /// Record a frame that failed to decode.
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_decode_error(self.kind.label());
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the feed is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnect attempts since the last successful session.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Frames received over the process lifetime.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Ticks decoded over the process lifetime.
    #[must_use]
    pub fn ticks_decoded(&self) -> u64 {
        self.ticks_decoded.load(Ordering::Relaxed)
    }

    /// Frames that failed to decode.
    #[must_use]
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Copy the current values.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state();
        FeedSnapshot {
            feed: self.kind.as_str(),
            state,
            connected: state == ConnectionState::Connected,
            reconnect_attempts: self.reconnect_attempts(),
            frames_received: self.frames_received(),
            ticks_decoded: self.ticks_decoded(),
            decode_errors: self.decode_errors(),
            last_tick_at: *self.last_tick_at.read(),
            last_connected_at: *self.last_connected_at.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let state = FeedState::new(FeedKind::Crypto);
        assert_eq!(state.state(), ConnectionState::Disconnected);
        assert!(!state.is_connected());
        assert!(state.snapshot().last_connected_at.is_none());
    }

    #[test]
    fn connected_records_time() {
        let state = FeedState::new(FeedKind::Forex);
        state.set_state(ConnectionState::Connected);

        let snapshot = state.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.feed, "forex");
        assert!(snapshot.last_connected_at.is_some());
    }

    #[test]
    fn counters_accumulate() {
        let state = FeedState::new(FeedKind::Crypto);
        state.record_frame();
        state.record_frame();
        state.record_tick(Utc::now());
        state.record_decode_error();
        state.record_reconnect();
        state.record_reconnect();

        assert_eq!(state.frames_received(), 2);
        assert_eq!(state.ticks_decoded(), 1);
        assert_eq!(state.decode_errors(), 1);
        assert_eq!(state.reconnect_attempts(), 2);

        state.clear_reconnects();
        assert_eq!(state.reconnect_attempts(), 0);
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Reconnecting).unwrap(),
            "\"reconnecting\""
        );
    }
}
