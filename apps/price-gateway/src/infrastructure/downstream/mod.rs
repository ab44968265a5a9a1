//! Downstream WebSocket Adapters
//!
//! Everything on the subscriber side of the gateway:
//!
//! - `messages`: control and price update wire types
//! - `channel`: [`SubscriberChannel`](crate::application::ports::SubscriberChannel)
//!   over a WebSocket write half
//! - `adapter`: per-connection receive loop
//!
//! [`serve_socket`] ties them together for one upgraded connection.

pub mod adapter;
pub mod channel;
pub mod messages;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::WebSocket;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

pub use adapter::ConnectionAdapter;
pub use channel::WebSocketChannel;
pub use messages::{ControlError, ControlRequest, PriceUpdateMessage};

use crate::infrastructure::broadcast::{ConnectionHandle, SharedBroadcastHub};
use crate::infrastructure::metrics;

/// Count of live downstream connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCounter(Arc<AtomicUsize>);

impl ConnectionCounter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections currently open.
    #[must_use]
    pub fn active(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    /// Count one connection until the returned guard is dropped.
    #[must_use]
    pub fn enter(&self) -> ConnectionGuard {
        let active = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_downstream_connections(active);
        ConnectionGuard(Arc::clone(&self.0))
    }
}

/// Live connection registration; decrements the counter on drop.
#[derive(Debug)]
pub struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.0.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::set_downstream_connections(active);
    }
}

/// Serve one upgraded WebSocket until it closes or the gateway shuts down.
pub async fn serve_socket(
    socket: WebSocket,
    hub: SharedBroadcastHub,
    connections: ConnectionCounter,
    cancel: CancellationToken,
) {
    let _guard = connections.enter();

    let (sink, stream) = socket.split();
    let handle = ConnectionHandle::new(Arc::new(WebSocketChannel::new(sink)));
    let connection = handle.id();

    tracing::info!(%connection, active = connections.active(), "Downstream connected");

    let released = ConnectionAdapter::new(hub, handle, cancel).run(stream).await;

    tracing::info!(%connection, released, "Downstream disconnected");
}
