//! Roomcast: room-scoped real-time notifications over Server-Sent Events.
//!
//! # Usage
//!
//! ```bash
//! roomcast --port 8080 --database ./data/roomcast.db --amqp-url amqp://localhost:5672/%2f
//! ```
//!
//! Environment variables can also be used:
//! - `ROOMCAST_PORT`: Port to listen on
//! - `ROOMCAST_DATABASE`: SQLite database file (in-memory store when unset)
//! - `RABBITMQ_URL`: Broker URL (queue consumer and publisher disabled when unset)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector for spans and metrics
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use roomcast::config::Config;
use roomcast::observability::metrics::init_metrics_with_endpoint;
use roomcast::observability::tracing::{init_tracing, shutdown_tracing, TraceExport};
use roomcast::server::run_server;
use std::fs;
use tokio_util::sync::CancellationToken;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let store = config
        .database
        .as_ref()
        .map_or_else(|| "in-memory".to_string(), |path| path.display().to_string());
    let broker = if config.amqp_url.is_some() {
        format!("{} -> {}", config.exchange, config.queue)
    } else {
        "disabled".to_string()
    };
    eprintln!(
        r#"
  Roomcast v{} - Room Notification Hub

  Configuration:
    Address:    {}:{}
    Store:      {}
    Queue:      {}
    Heartbeat:  {}s
    Log Level:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.host,
        config.port,
        store,
        broker,
        config.heartbeat_secs,
        config.log_level
    );
}

/// Resolve once SIGINT or SIGTERM arrives.
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating shutdown...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                if let Err(e) = ctrl_c.await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging (with optional OTLP span export)
    init_tracing(
        &config.log_level,
        config.log_format,
        TraceExport {
            endpoint: config.otel_endpoint.as_deref(),
            service_name: &config.otel_service_name,
        },
    );

    // Initialize metrics (with optional OTLP export)
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    // Ensure the database directory exists
    if let Some(parent) = config.database.as_ref().and_then(|path| path.parent()) {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    print_banner(&config);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_token.cancel();
    });

    let result = run_server(config, shutdown).await;
    shutdown_tracing();
    result.map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!("Roomcast shutdown complete");
    Ok(())
}
