//! Subscription Broadcast Hub
//!
//! Tracks which downstream connections want which instruments and fans
//! price updates out to them.
//!
//! # Architecture
//!
//! The `BroadcastHub` keeps one subscriber set per instrument in a sharded
//! concurrent map. A publish:
//!
//! 1. snapshots the subscriber set for the tick's instrument,
//! 2. serializes the update once,
//! 3. sends it to the snapshot in batches of `batch_size`, with all sends in
//!    a batch running concurrently and batches running one after another.
//!
//! A failed, closed or timed-out subscriber is counted and logged; it never
//! affects delivery to the rest of its batch or to later batches.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;

use crate::application::ports::{ChannelError, PriceBroadcaster, SubscriberChannel};
use crate::domain::streaming::{InstrumentSymbol, PriceTick};
use crate::domain::subscription::{ClientSubscriptions, ConnectionId, SubscriptionAction};
use crate::infrastructure::downstream::messages::{ControlError, ControlRequest, PriceUpdateMessage};
use crate::infrastructure::metrics;
use crate::BroadcastSettings;

// =============================================================================
// Connection Handle
// =============================================================================

/// Reference to one live downstream channel, as stored in the subscription
/// table.
///
/// Equality and hashing use the connection id only.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    channel: Arc<dyn SubscriberChannel>,
}

impl ConnectionHandle {
    /// Wrap a channel under a fresh connection id.
    #[must_use]
    pub fn new(channel: Arc<dyn SubscriberChannel>) -> Self {
        Self::with_id(ConnectionId::new(), channel)
    }

    /// Wrap a channel under an explicit connection id.
    #[must_use]
    pub fn with_id(id: ConnectionId, channel: Arc<dyn SubscriberChannel>) -> Self {
        Self { id, channel }
    }

    /// Connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the underlying channel still accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Close the underlying channel so publishes skip it.
    pub fn close(&self) {
        self.channel.close();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("open", &self.channel.is_open())
            .finish()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Default number of subscribers sent to concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default per-send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Fan-out tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Maximum concurrent sends per batch. Always at least 1.
    pub batch_size: usize,
    /// Upper bound on a single send; `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
}

impl BroadcastConfig {
    /// Create a configuration, clamping `batch_size` to at least 1.
    #[must_use]
    pub fn new(batch_size: usize, send_timeout: Option<Duration>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            send_timeout,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, Some(DEFAULT_SEND_TIMEOUT))
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self::new(settings.batch_size, settings.send_timeout)
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one [`BroadcastHub::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Number of batches sent.
    pub batches: usize,
    /// Subscribers in the snapshot.
    pub attempted: usize,
    /// Sends that completed successfully.
    pub delivered: usize,
    /// Subscribers skipped because their channel was closed.
    pub skipped: usize,
    /// Sends that failed or timed out.
    pub failed: usize,
}

/// Outcome of one accepted control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    /// Action that was applied.
    pub action: SubscriptionAction,
    /// Normalized instruments the action was applied to.
    pub applied: Vec<InstrumentSymbol>,
    /// Blank entries that were ignored.
    pub skipped: usize,
}

/// Statistics about the subscription table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Instruments with a (possibly empty) subscriber set.
    pub instruments: usize,
    /// Total (instrument, connection) memberships.
    pub subscriptions: usize,
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Instrument → subscriber set table with batched fan-out.
pub struct BroadcastHub {
    subscribers: DashMap<InstrumentSymbol, HashMap<ConnectionId, ConnectionHandle>>,
    config: BroadcastConfig,
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl BroadcastHub {
    /// Create a new hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            subscribers: DashMap::new(),
            config,
        }
    }

    /// Create a new hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Fan-out configuration.
    #[must_use]
    pub const fn config(&self) -> BroadcastConfig {
        self.config
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Add `handle` to the subscriber set of `instrument`, creating the set
    /// if needed. Returns `true` if the handle was not already present.
    pub fn subscribe(&self, instrument: &InstrumentSymbol, handle: &ConnectionHandle) -> bool {
        self.subscribers
            .entry(instrument.clone())
            .or_default()
            .insert(handle.id, handle.clone())
            .is_none()
    }

    /// Remove `handle` from the subscriber set of `instrument`. Returns
    /// `true` if it was present.
    pub fn unsubscribe(&self, instrument: &InstrumentSymbol, handle: &ConnectionHandle) -> bool {
        self.subscribers
            .get_mut(instrument)
            .is_some_and(|mut set| set.remove(&handle.id).is_some())
    }

    /// Remove `handle` from every instrument recorded in `local`.
    ///
    /// Only the recorded instruments are touched. Returns the number of
    /// memberships actually removed.
    pub fn release(&self, handle: &ConnectionHandle, local: ClientSubscriptions) -> usize {
        let removed = local
            .into_iter()
            .filter(|instrument| self.unsubscribe(instrument, handle))
            .count();

        tracing::debug!(connection_id = %handle.id, removed, "Released connection subscriptions");
        removed
    }

    /// Number of subscribers currently registered for `instrument`.
    #[must_use]
    pub fn subscriber_count(&self, instrument: &InstrumentSymbol) -> usize {
        self.subscribers.get(instrument).map_or(0, |set| set.len())
    }

    /// Whether `handle` is subscribed to `instrument`.
    #[must_use]
    pub fn is_subscribed(&self, instrument: &InstrumentSymbol, handle: &ConnectionHandle) -> bool {
        self.subscribers
            .get(instrument)
            .is_some_and(|set| set.contains_key(&handle.id))
    }

    /// Statistics about the subscription table.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        self.subscribers
            .iter()
            .fold(BroadcastStats::default(), |mut stats, entry| {
                stats.instruments += 1;
                stats.subscriptions += entry.value().len();
                stats
            })
    }

    // =========================================================================
    // Control Messages
    // =========================================================================

    /// Apply a client control message on behalf of `handle`.
    ///
    /// Subscribes add the handle to every listed instrument and record them
    /// in `local`; unsubscribes remove the handle and drop them from `local`.
    /// Blank instrument names are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] if the message is malformed or names an
    /// unknown action. Nothing is changed in that case.
    pub fn handle_control_message(
        &self,
        text: &str,
        handle: &ConnectionHandle,
        local: &mut ClientSubscriptions,
    ) -> Result<ControlOutcome, ControlError> {
        let request = match ControlRequest::parse(text) {
            Ok(request) => request,
            Err(e) => {
                metrics::record_control_message("rejected");
                return Err(e);
            }
        };

        let mut outcome = ControlOutcome {
            action: request.action,
            applied: Vec::with_capacity(request.instruments.len()),
            skipped: 0,
        };

        for raw in &request.instruments {
            let Some(instrument) = InstrumentSymbol::parse(raw) else {
                outcome.skipped += 1;
                continue;
            };

            match request.action {
                SubscriptionAction::Subscribe => {
                    self.subscribe(&instrument, handle);
                    local.record(instrument.clone());
                }
                SubscriptionAction::Unsubscribe => {
                    self.unsubscribe(&instrument, handle);
                    local.forget(&instrument);
                }
            }
            outcome.applied.push(instrument);
        }

        metrics::record_control_message("accepted");
        tracing::debug!(
            connection_id = %handle.id,
            action = request.action.as_str(),
            instruments = outcome.applied.len(),
            skipped = outcome.skipped,
            "Applied control message"
        );

        Ok(outcome)
    }

    // =========================================================================
    // Publish
    // =========================================================================

    /// Send `tick` to every current subscriber of its instrument.
    ///
    /// Subscribers are snapshotted up front; connections that subscribe
    /// while the publish is running are not included.
    pub async fn publish(&self, tick: &PriceTick) -> PublishReport {
        let snapshot: Vec<ConnectionHandle> = match self.subscribers.get(tick.instrument()) {
            Some(set) if !set.is_empty() => set.values().cloned().collect(),
            _ => return PublishReport::default(),
        };

        let payload: Arc<str> = match PriceUpdateMessage::from(tick).to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!(instrument = %tick.instrument(), error = %e, "Failed to serialize price update");
                return PublishReport::default();
            }
        };

        let started = Instant::now();
        let mut report = PublishReport {
            attempted: snapshot.len(),
            ..PublishReport::default()
        };

        for batch in snapshot.chunks(self.config.batch_size) {
            report.batches += 1;

            let mut sends = Vec::with_capacity(batch.len());
            for handle in batch {
                if handle.is_open() {
                    sends.push(self.deliver(handle, Arc::clone(&payload)));
                } else {
                    report.skipped += 1;
                }
            }

            for (id, result) in join_all(sends).await {
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            connection_id = %id,
                            instrument = %tick.instrument(),
                            error = %e,
                            "Failed to deliver price update"
                        );
                    }
                }
            }
        }

        metrics::record_publish(
            report.batches as u64,
            report.delivered as u64,
            report.failed as u64,
            report.skipped as u64,
            started.elapsed(),
        );

        report
    }

    async fn deliver(
        &self,
        handle: &ConnectionHandle,
        payload: Arc<str>,
    ) -> (ConnectionId, Result<(), ChannelError>) {
        let send = handle.channel.send_text(payload);
        let result = match self.config.send_timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .unwrap_or(Err(ChannelError::Timeout(limit.as_millis()))),
            None => send.await,
        };
        (handle.id, result)
    }
}

#[async_trait]
impl PriceBroadcaster for BroadcastHub {
    async fn broadcast(&self, tick: PriceTick) {
        let report = self.publish(&tick).await;
        if report.attempted > 0 {
            tracing::trace!(
                instrument = %tick.instrument(),
                batches = report.batches,
                delivered = report.delivered,
                failed = report.failed,
                skipped = report.skipped,
                "Published price update"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
