//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Tiingo WebSocket feed clients (crypto, forex).
pub mod tiingo;

/// Subscription table and batched fan-out.
pub mod broadcast;

/// Downstream WebSocket connections.
pub mod downstream;

/// Configuration and dependency injection.
pub mod config;

/// HTTP server: WebSocket endpoint, snapshot queries, health.
pub mod server;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
