//! Price Gateway Binary
//!
//! Starts the real-time price gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TIINGO_TOKEN`: Tiingo API token
//!
//! ## Optional
//! - `TIINGO_CRYPTO_WS_URI` / `TIINGO_FX_WS_URI`: upstream feed URLs
//! - `GATEWAY_CRYPTO_TICKERS` / `GATEWAY_FOREX_TICKERS`: comma-separated instruments
//! - `GATEWAY_HTTP_PORT`: HTTP and WebSocket port (default: 8080)
//! - `GATEWAY_BROADCAST_BATCH_SIZE`: fan-out batch size (default: 100)
//! - `GATEWAY_SEND_TIMEOUT_MS`: per-send timeout, 0 disables (default: 5000)
//! - `GATEWAY_PUBLISH_WORKERS` / `GATEWAY_PUBLISH_QUEUE_CAPACITY`: publish queue sizing
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_gateway::infrastructure::telemetry;
use price_gateway::{
    BroadcastConfig, BroadcastHub, FeedClient, FeedClientConfig, FeedKind, GatewayConfig,
    GatewayServer, GatewayState, PriceStore, PublishQueue, PublishQueueConfig, TickDispatcher,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for tasks after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting price gateway");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Latest prices, seeded so every configured instrument is listed
    let store = Arc::new(PriceStore::seeded(config.feeds.all_tickers()));

    // Fan-out
    let broadcast_hub = Arc::new(BroadcastHub::new(BroadcastConfig::from(config.broadcast)));
    let publish_queue = Arc::new(PublishQueue::start(
        broadcast_hub.clone(),
        PublishQueueConfig::new(
            config.broadcast.publish_workers,
            config.broadcast.publish_queue_capacity,
        ),
        shutdown_token.clone(),
    ));
    let dispatcher = TickDispatcher::new(Arc::clone(&store), Arc::clone(&publish_queue));

    // Upstream feeds
    let feed_clients: Vec<Arc<FeedClient>> = [FeedKind::Crypto, FeedKind::Forex]
        .into_iter()
        .map(|kind| {
            Arc::new(FeedClient::new(
                FeedClientConfig::from_gateway(kind, &config),
                dispatcher.clone(),
                shutdown_token.clone(),
            ))
        })
        .collect();
    let feed_states = feed_clients.iter().map(|client| client.state()).collect();

    let mut tasks = tokio::task::JoinSet::new();
    for client in feed_clients {
        tasks.spawn(client.run());
    }

    // HTTP + WebSocket server
    let state = Arc::new(GatewayState::new(
        env!("CARGO_PKG_VERSION"),
        Arc::clone(&store),
        Arc::clone(&broadcast_hub),
        feed_states,
        shutdown_token.clone(),
    ));
    let server = GatewayServer::new(config.server.http_port, state);
    let server_shutdown = shutdown_token.clone();
    tasks.spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Gateway server error");
            server_shutdown.cancel();
        }
    });

    tracing::info!("Price gateway ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
        publish_queue.closed().await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timed out, abandoning remaining tasks");
    }

    tracing::info!(
        dropped_ticks = publish_queue.dropped(),
        "Price gateway stopped"
    );
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        crypto_tickers = config.feeds.crypto_tickers.len(),
        forex_tickers = config.feeds.forex_tickers.len(),
        batch_size = config.broadcast.batch_size,
        publish_workers = config.broadcast.publish_workers,
        "Configuration loaded"
    );
    tracing::debug!(
        crypto_url = %config.feeds.crypto_url,
        forex_url = %config.feeds.forex_url,
        "Feed endpoints"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT), or an internal
/// cancellation, then cancel every task.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal shutdown requested");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
