//! WebSocket Subscriber Channel
//!
//! [`SubscriberChannel`] over the write half of a downstream WebSocket.
//! Several publish workers may write to the same connection, so writes are
//! serialized through an async mutex.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;

use crate::application::ports::{ChannelError, SubscriberChannel};

/// Write half of a downstream connection.
pub struct WebSocketChannel<S = SplitSink<WebSocket, Message>> {
    sink: Mutex<S>,
    open: AtomicBool,
}

impl<S> WebSocketChannel<S> {
    /// Wrap an open sink.
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
        }
    }
}

impl<S> fmt::Debug for WebSocketChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S> SubscriberChannel for WebSocketChannel<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: fmt::Display,
{
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    async fn send_text(&self, payload: Arc<str>) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(payload.as_ref().into())).await {
            self.close();
            return Err(ChannelError::Transport(e.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use futures::channel::mpsc;

    use super::*;

    #[tokio::test]
    async fn sends_text_frames() {
        let (tx, mut rx) = mpsc::unbounded::<Message>();
        let channel = WebSocketChannel::new(tx);

        channel.send_text(Arc::from("{\"a\":1}")).await.unwrap();

        match rx.next().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "{\"a\":1}"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_channel_rejects_sends() {
        let (tx, _rx) = mpsc::unbounded::<Message>();
        let channel = WebSocketChannel::new(tx);

        channel.close();

        assert!(!channel.is_open());
        assert_eq!(
            channel.send_text(Arc::from("x")).await,
            Err(ChannelError::Closed)
        );
    }

    #[tokio::test]
    async fn transport_failure_closes_channel() {
        let (tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);
        let channel = WebSocketChannel::new(tx);

        let result = channel.send_text(Arc::from("x")).await;

        assert!(matches!(result, Err(ChannelError::Transport(_))));
        assert!(!channel.is_open());
    }
}
