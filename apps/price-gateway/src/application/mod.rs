//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and the port interfaces
//! through which ingestion hands ticks to downstream fan-out.

/// Port interfaces for subscriber channels and tick broadcasting.
pub mod ports;

/// Tick dispatch and the bounded publish queue.
pub mod services;
