#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Gateway - Real-time Price Distribution
//!
//! Maintains one upstream connection per Tiingo feed (crypto, forex), keeps
//! the latest price per instrument and fans every update out to the
//! WebSocket clients subscribed to that instrument.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core price types and in-memory state
//!   - `streaming`: Instrument symbols and price ticks
//!   - `prices`: Concurrent latest-price store
//!   - `subscription`: Per-connection subscription records
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Subscriber channel and broadcaster interfaces
//!   - `services`: Tick dispatch and the publish queue
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `tiingo`: WebSocket clients for the crypto and forex feeds
//!   - `broadcast`: Subscription table and batched fan-out
//!   - `downstream`: Per-connection adapter and WebSocket channel
//!   - `server`: WebSocket endpoint, snapshot queries, health
//!   - `config`: Configuration loading
//!
//! # Data Flow
//!
//! ```text
//! Tiingo crypto WS ──┐                    ┌─────────────┐
//!                    ├──► TickDispatcher ─┤ PriceStore  │◄── GET /instruments/...
//! Tiingo forex WS ───┘         │          └─────────────┘
//!                              ▼
//!                        PublishQueue ──► BroadcastHub ──► /ws client 1
//!                       (per-instrument     (batches)  ──► /ws client 2
//!                        workers)                      ──► /ws client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core price types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::prices::{PriceStore, SharedPriceStore};
pub use domain::streaming::{BlankSymbol, InstrumentSymbol, PriceTick, TickError};
pub use domain::subscription::{ClientSubscriptions, ConnectionId, SubscriptionAction};

// Application services
pub use application::ports::{ChannelError, PriceBroadcaster, SubscriberChannel};
pub use application::services::{PublishQueue, PublishQueueConfig, SubmitOutcome, TickDispatcher};

// Infrastructure config
pub use infrastructure::config::{
    ApiToken, BroadcastSettings, ConfigError, FeedSettings, GatewayConfig, ServerSettings,
    WebSocketSettings,
};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastStats, ConnectionHandle, PublishReport,
    SharedBroadcastHub,
};

// Feed clients
pub use infrastructure::tiingo::{
    FeedClient, FeedClientConfig, FeedKind, FeedState, ReconnectConfig, TiingoCodec,
};

// Server
pub use infrastructure::server::{GatewayServer, GatewayState, ServerError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
