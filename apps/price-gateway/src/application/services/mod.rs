//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TickDispatcher`: records each decoded tick and hands it to the
//!   publish queue without waiting for delivery
//! - `PublishQueue`: bounded, instrument-sharded queue drained by publish
//!   workers that call the `PriceBroadcaster` port

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::application::ports::PriceBroadcaster;
use crate::domain::prices::SharedPriceStore;
use crate::domain::streaming::{InstrumentSymbol, PriceTick};
use crate::infrastructure::metrics;

// =============================================================================
// Publish Queue
// =============================================================================

/// Publish queue sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishQueueConfig {
    /// Number of publish workers. Always at least 1.
    pub workers: usize,
    /// Queue capacity per worker. Always at least 1.
    pub capacity: usize,
}

impl PublishQueueConfig {
    /// Create a configuration, clamping both values to at least 1.
    #[must_use]
    pub fn new(workers: usize, capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            capacity: capacity.max(1),
        }
    }
}

impl Default for PublishQueueConfig {
    fn default() -> Self {
        Self::new(4, 4096)
    }
}

/// Result of [`PublishQueue::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The tick was queued for broadcast.
    Queued,
    /// The worker queue was full; the tick will not be broadcast.
    Dropped,
    /// The workers have stopped.
    Closed,
}

/// Bounded, non-blocking hand-off from ingestion to fan-out.
///
/// Every tick of one instrument goes to the same worker, and each worker
/// publishes in FIFO order, so subscribers see an instrument's ticks in the
/// order they were submitted.
#[derive(Debug)]
pub struct PublishQueue {
    senders: Vec<mpsc::Sender<PriceTick>>,
    tracker: TaskTracker,
    dropped: AtomicU64,
}

impl PublishQueue {
    /// Spawn the publish workers on the current runtime.
    #[must_use]
    pub fn start(
        broadcaster: Arc<dyn PriceBroadcaster>,
        config: PublishQueueConfig,
        cancel: CancellationToken,
    ) -> Self {
        let tracker = TaskTracker::new();
        let senders = (0..config.workers)
            .map(|worker| {
                let (tx, rx) = mpsc::channel(config.capacity);
                tracker.spawn(run_worker(
                    worker,
                    rx,
                    Arc::clone(&broadcaster),
                    cancel.clone(),
                ));
                tx
            })
            .collect();
        tracker.close();

        tracing::info!(
            workers = config.workers,
            capacity = config.capacity,
            "Publish queue started"
        );

        Self {
            senders,
            tracker,
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue `tick` for broadcast without waiting.
    pub fn submit(&self, tick: PriceTick) -> SubmitOutcome {
        let shard = self.shard_for(tick.instrument());
        match self.senders[shard].try_send(tick) {
            Ok(()) => SubmitOutcome::Queued,
            Err(TrySendError::Full(tick)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_tick_dropped();
                tracing::warn!(
                    instrument = %tick.instrument(),
                    worker = shard,
                    "Publish queue full, dropping tick"
                );
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SubmitOutcome::Closed,
        }
    }

    /// Ticks dropped because a worker queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait for every worker to exit (after cancellation).
    pub async fn closed(&self) {
        self.tracker.wait().await;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard_for(&self, instrument: &InstrumentSymbol) -> usize {
        let mut hasher = DefaultHasher::new();
        instrument.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }
}

async fn run_worker(
    worker: usize,
    mut rx: mpsc::Receiver<PriceTick>,
    broadcaster: Arc<dyn PriceBroadcaster>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker, "Publish worker started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(tick) => broadcaster.broadcast(tick).await,
                None => break,
            },
        }
    }

    tracing::debug!(worker, "Publish worker stopped");
}

// =============================================================================
// Tick Dispatcher
// =============================================================================

/// Ingestion-side entry point for decoded ticks.
#[derive(Debug, Clone)]
pub struct TickDispatcher {
    store: SharedPriceStore,
    queue: Arc<PublishQueue>,
}

impl TickDispatcher {
    /// Create a dispatcher over `store` and `queue`.
    #[must_use]
    pub const fn new(store: SharedPriceStore, queue: Arc<PublishQueue>) -> Self {
        Self { store, queue }
    }

    /// Store `tick` as the latest price and queue it for broadcast.
    ///
    /// The store update is visible before this returns; delivery happens
    /// later on a publish worker.
    pub fn dispatch(&self, tick: PriceTick) -> SubmitOutcome {
        let instrument = tick.instrument().clone();
        self.store.upsert(&instrument, tick.clone());
        self.queue.submit(tick)
    }

    /// Shared price store.
    #[must_use]
    pub const fn store(&self) -> &SharedPriceStore {
        &self.store
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::{Mutex, Notify};

    use super::*;
    use crate::application::ports::MockPriceBroadcaster;
    use crate::domain::prices::PriceStore;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<PriceTick>>,
        notify: Notify,
    }

    #[async_trait]
    impl PriceBroadcaster for Recorder {
        async fn broadcast(&self, tick: PriceTick) {
            self.seen.lock().await.push(tick);
            self.notify.notify_one();
        }
    }

    struct Blocked(Notify);

    #[async_trait]
    impl PriceBroadcaster for Blocked {
        async fn broadcast(&self, _tick: PriceTick) {
            self.0.notified().await;
        }
    }

    fn tick(symbol: &str, price: i64) -> PriceTick {
        PriceTick::new(
            InstrumentSymbol::parse(symbol).unwrap(),
            Decimal::from(price),
            Utc::now(),
        )
        .unwrap()
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.seen.lock().await.len() < count {
                recorder.notify.notified().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn config_is_clamped() {
        assert_eq!(PublishQueueConfig::new(0, 0), PublishQueueConfig::new(1, 1));
    }

    #[tokio::test]
    async fn preserves_per_instrument_order() {
        let recorder = Arc::new(Recorder::default());
        let queue = PublishQueue::start(
            recorder.clone(),
            PublishQueueConfig::new(4, 256),
            CancellationToken::new(),
        );

        for price in 0..100 {
            assert_eq!(queue.submit(tick("btcusdt", price)), SubmitOutcome::Queued);
        }
        wait_for(&recorder, 100).await;

        let prices: Vec<Decimal> = recorder
            .seen
            .lock()
            .await
            .iter()
            .map(PriceTick::price)
            .collect();
        let expected: Vec<Decimal> = (0..100).map(Decimal::from).collect();
        assert_eq!(prices, expected);
    }

    #[tokio::test]
    async fn full_queue_drops_ticks() {
        let blocked = Arc::new(Blocked(Notify::new()));
        let queue = PublishQueue::start(
            blocked.clone(),
            PublishQueueConfig::new(1, 1),
            CancellationToken::new(),
        );

        // The worker has not run yet on this single-threaded runtime, so the
        // first tick fills the queue and the rest are dropped.
        assert_eq!(queue.submit(tick("eurusd", 1)), SubmitOutcome::Queued);
        assert_eq!(queue.submit(tick("eurusd", 2)), SubmitOutcome::Dropped);
        assert_eq!(queue.submit(tick("eurusd", 3)), SubmitOutcome::Dropped);
        assert_eq!(queue.dropped(), 2);

        blocked.0.notify_waiters();
    }

    #[tokio::test]
    async fn workers_stop_on_cancel() {
        let mut broadcaster = MockPriceBroadcaster::new();
        broadcaster.expect_broadcast().never();

        let cancel = CancellationToken::new();
        let queue = PublishQueue::start(
            Arc::new(broadcaster),
            PublishQueueConfig::default(),
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), queue.closed())
            .await
            .unwrap();

        assert_eq!(queue.submit(tick("btcusdt", 1)), SubmitOutcome::Closed);
    }

    #[tokio::test]
    async fn dispatch_updates_store_before_delivery() {
        let blocked = Arc::new(Blocked(Notify::new()));
        let queue = Arc::new(PublishQueue::start(
            blocked.clone(),
            PublishQueueConfig::default(),
            CancellationToken::new(),
        ));
        let store = Arc::new(PriceStore::new());
        let dispatcher = TickDispatcher::new(Arc::clone(&store), queue);

        let t = tick("XRPUSDT", 2);
        assert_eq!(dispatcher.dispatch(t.clone()), SubmitOutcome::Queued);

        assert_eq!(store.latest(&InstrumentSymbol::parse("xrpusdt").unwrap()), t);
        assert_eq!(dispatcher.store().len(), 1);

        blocked.0.notify_waiters();
    }

    #[tokio::test]
    async fn dispatch_reaches_broadcaster() {
        let recorder = Arc::new(Recorder::default());
        let queue = Arc::new(PublishQueue::start(
            recorder.clone(),
            PublishQueueConfig::new(2, 16),
            CancellationToken::new(),
        ));
        let dispatcher = TickDispatcher::new(Arc::new(PriceStore::new()), queue);

        dispatcher.dispatch(tick("btcusdt", 1));
        dispatcher.dispatch(tick("eurusd", 2));
        wait_for(&recorder, 2).await;

        let seen = recorder.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().any(|t| t.instrument().as_str() == "eurusd"));
    }
}
