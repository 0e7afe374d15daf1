//! Ticker Stream Binary
//!
//! Connects to the 24h ticker stream, logs ticks and lifecycle events, and
//! serves health and metrics endpoints.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-stream
//! ```
//!
//! # Environment Variables
//!
//! - `TICKER_STREAM_ENDPOINT`: WebSocket endpoint (default: <wss://stream.binance.com:9443/ws>)
//! - `TICKER_STREAM_SYMBOLS`: Comma-separated symbols (default: BTCUSDT,ETHUSDT,BNBUSDT,ADAUSDT,DOTUSDT)
//! - `TICKER_STREAM_FOCUS`: Initially focused symbol (default: first symbol)
//! - `TICKER_STREAM_BATCH_INTERVAL_MS`: Series batching interval, 8-1000 (default: 16)
//! - `TICKER_STREAM_HEARTBEAT_TIMEOUT_SECS`: Stale stream timeout (default: 10)
//! - `TICKER_STREAM_MAX_RECONNECT_ATTEMPTS`: Attempts before giving up (default: 5)
//! - `TICKER_STREAM_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use ticker_stream::infrastructure::health::{HealthServer, HealthServerState};
use ticker_stream::infrastructure::telemetry;
use ticker_stream::{
    BinanceCodec, ConnectionManager, ConnectionState, StreamConfig, StreamEvent,
    WebSocketTransport, init_metrics,
};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err("failed to install rustls crypto provider".into());
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting ticker stream");

    let _metrics_handle = init_metrics()?;

    let config = StreamConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let manager = ConnectionManager::new(
        config.manager_config()?,
        Arc::new(WebSocketTransport::new(config.stream.endpoint.clone())),
        Arc::new(BinanceCodec::new()),
    )?;
    if let Some(focus) = &config.stream.focus {
        manager.set_focus(focus);
    }

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        manager.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let events = manager.subscribe();
    let events_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        log_events(events, events_shutdown).await;
    });

    manager.connect();
    tracing::info!(focus = %manager.focus(), "Ticker stream ready");

    await_shutdown(shutdown_token).await;

    manager.disconnect();
    tracing::info!(stats = ?manager.stats(), "Ticker stream stopped");
    Ok(())
}

/// Log stream events until shutdown.
async fn log_events(mut rx: broadcast::Receiver<StreamEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(StreamEvent::StateChanged { state }) => {
                if state == ConnectionState::Failed {
                    tracing::error!("Stream failed, reconnect attempts exhausted");
                } else {
                    tracing::info!(state = %state, "Stream state");
                }
            }
            Ok(StreamEvent::TickReceived { tick }) => {
                tracing::info!(
                    symbol = %tick.symbol,
                    price = %tick.last_price,
                    change_pct = %tick.percent_change,
                    "Tick"
                );
            }
            Ok(StreamEvent::ErrorOccurred { error }) => {
                tracing::warn!(kind = error.kind(), error = %error, "Stream error");
            }
            Ok(StreamEvent::Reconnecting {
                attempt,
                delay,
                reason,
            }) => {
                tracing::info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = reason.as_str(),
                    "Reconnecting"
                );
            }
            Ok(StreamEvent::SeriesUpdated { symbol, len }) => {
                tracing::debug!(symbol = %symbol, len, "Series updated");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        endpoint = %config.stream.endpoint,
        symbols = %config.stream.symbols.join(","),
        batch_interval_ms = u64::try_from(config.stream.batch_interval.as_millis()).unwrap_or(u64::MAX),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        connect_timeout_secs = config.connection.connect_timeout.as_secs(),
        heartbeat_interval_secs = config.connection.heartbeat_interval.as_secs(),
        heartbeat_timeout_secs = config.connection.heartbeat_timeout.as_secs(),
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        "Connection settings"
    );
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

/// Wait for shutdown signal (SIGTERM or SIGINT).
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
    }

    shutdown_token.cancel();
}
