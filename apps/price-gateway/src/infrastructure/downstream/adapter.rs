//! Connection Adapter
//!
//! Drives one downstream connection: applies its control messages to the
//! hub and releases its subscriptions when the connection ends.

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::domain::subscription::ClientSubscriptions;
use crate::infrastructure::broadcast::{ConnectionHandle, SharedBroadcastHub};

/// Receive loop for one accepted connection.
#[derive(Debug)]
pub struct ConnectionAdapter {
    hub: SharedBroadcastHub,
    handle: ConnectionHandle,
    subscriptions: ClientSubscriptions,
    cancel: CancellationToken,
}

impl ConnectionAdapter {
    /// Create an adapter for `handle`.
    #[must_use]
    pub fn new(hub: SharedBroadcastHub, handle: ConnectionHandle, cancel: CancellationToken) -> Self {
        Self {
            hub,
            handle,
            subscriptions: ClientSubscriptions::new(),
            cancel,
        }
    }

    /// Process inbound frames until the connection closes, errors, or the
    /// gateway shuts down.
    ///
    /// On exit the channel is closed and removed from every instrument it
    /// subscribed to. Returns the number of memberships released.
    pub async fn run<S>(mut self, mut incoming: S) -> usize
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let connection = self.handle.id();

        loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => break,
                frame = incoming.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.on_text(text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.on_text(text),
                    Err(_) => {
                        tracing::debug!(%connection, "Ignoring non UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(%connection, error = %e, "Downstream receive failed");
                    break;
                }
            }
        }

        self.handle.close();

        let Self {
            hub,
            handle,
            subscriptions,
            ..
        } = self;
        let released = hub.release(&handle, subscriptions);

        tracing::debug!(%connection, released, "Connection adapter finished");
        released
    }

    fn on_text(&mut self, text: &str) {
        let connection = self.handle.id();

        match self
            .hub
            .handle_control_message(text, &self.handle, &mut self.subscriptions)
        {
            Ok(outcome) => {
                tracing::debug!(
                    %connection,
                    action = outcome.action.as_str(),
                    instruments = outcome.applied.len(),
                    "Control message applied"
                );
            }
            Err(e) => {
                tracing::warn!(%connection, error = %e, "Rejected control message");
            }
        }
    }
}
