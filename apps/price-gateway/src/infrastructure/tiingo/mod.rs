//! Tiingo WebSocket Adapters
//!
//! Upstream clients for Tiingo's real-time streams:
//!
//! - **Crypto**: top-of-book trades, price of record is `lastPrice`
//! - **Forex**: quotes, price of record is `askPrice`
//!
//! Both feeds share one JSON codec parameterized by [`FeedKind`].

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod state;

pub use client::{FeedClient, FeedClientConfig, FeedClientError};
pub use codec::{CodecError, FeedKind, FrameOutcome, TiingoCodec};
pub use messages::{Envelope, ResponseStatus, SubscribeRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use state::{ConnectionState, FeedSnapshot, FeedState};
