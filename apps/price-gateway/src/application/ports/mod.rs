//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following the
//! Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `SubscriberChannel`: one live downstream channel the broadcast hub
//!   pushes serialized price updates into
//! - `PriceBroadcaster`: fan-out of a decoded tick to interested subscribers

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::streaming::PriceTick;

/// Errors that can occur while pushing to a subscriber channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel was already closed.
    #[error("channel closed")]
    Closed,

    /// The underlying transport rejected the write.
    #[error("transport error: {0}")]
    Transport(String),

    /// The write did not complete in time.
    #[error("send timed out after {0} ms")]
    Timeout(u128),
}

/// A live bidirectional channel to one subscriber, seen from the sending side.
///
/// Implementations must tolerate concurrent `send_text` calls from several
/// publish workers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriberChannel: Send + Sync {
    /// Whether the channel can currently accept writes.
    fn is_open(&self) -> bool;

    /// Mark the channel closed; later sends fail with [`ChannelError::Closed`].
    fn close(&self);

    /// Push one already-serialized text payload.
    async fn send_text(&self, payload: Arc<str>) -> Result<(), ChannelError>;
}

/// Fan-out of price ticks to downstream subscribers.
///
/// Delivery is best-effort; implementations log and count their own
/// failures instead of reporting them to the ingestion path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceBroadcaster: Send + Sync {
    /// Deliver `tick` to every current subscriber of its instrument.
    async fn broadcast(&self, tick: PriceTick);
}
