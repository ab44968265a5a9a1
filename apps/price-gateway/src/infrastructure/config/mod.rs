//! Configuration Module
//!
//! Configuration loading for the gateway service.

mod settings;

pub use settings::{
    ApiToken, BroadcastSettings, ConfigError, FeedSettings, GatewayConfig, ServerSettings,
    WebSocketSettings,
};
