//! Domain Layer - Core price types and in-memory state.
//!
//! This layer contains the core domain types for price distribution with
//! no transport dependencies.

/// Instrument symbols and price ticks.
pub mod streaming;

/// Concurrent latest-price cache.
pub mod prices;

/// Per-connection subscription tracking.
pub mod subscription;
