//! HTTP server setup and lifecycle.
//!
//! Wires together:
//! - The notification store, hub loop and notification service
//! - The queue consumer and publisher
//! - The axum router, served with graceful shutdown
//!
//! Every background loop runs on one task tracker and observes the shutdown
//! token. Once HTTP serving ends, the token is cancelled and tracked tasks
//! get the configured grace period to finish.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::flow::Hub;
use crate::notify::NotificationService;
use crate::queue::{QueueConsumer, QueuePublisher};
use crate::service::create_router;
use crate::storage::open_store;

pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Server state shared across handlers.
pub struct ServerState {
    pub service: NotificationService,
    pub publisher: QueuePublisher,
    /// Backfill size when a stream request gives none.
    pub history_limit: usize,
    pub heartbeat: Duration,
    pub shutdown: CancellationToken,
    /// Tracks stream sessions and background loops.
    pub tasks: TaskTracker,
}

impl ServerState {
    pub fn new(
        service: NotificationService,
        publisher: QueuePublisher,
        config: &Config,
        shutdown: CancellationToken,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            service,
            publisher,
            history_limit: config.history_limit,
            heartbeat: config.heartbeat(),
            shutdown,
            tasks,
        }
    }
}

/// Run the Roomcast server on the configured address.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `shutdown` - Cancelled to stop the server
///
/// # Returns
///
/// Returns when the server has shut down.
pub async fn run_server(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    serve(listener, config, shutdown).await
}

/// Run the server on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = listener.local_addr()?;
    let tasks = TaskTracker::new();

    let store = open_store(&config)?;
    let (hub, hub_loop) = Hub::new();
    tasks.spawn(hub_loop.run(shutdown.clone()));
    let service = NotificationService::new(store, hub);

    let consumer = QueueConsumer::from_config(&config, service.clone());
    let consumer_cancel = shutdown.clone();
    tasks.spawn(async move {
        // A dead consumer leaves the HTTP surface running.
        if let Err(e) = consumer.start(consumer_cancel).await {
            tracing::error!(error = %e, "Queue consumer stopped with error");
        }
    });

    let publisher = QueuePublisher::from_config(&config);
    tracing::debug!(enabled = publisher.is_enabled(), "Queue publisher configured");

    let state = Arc::new(ServerState::new(
        service,
        publisher,
        &config,
        shutdown.clone(),
        tasks.clone(),
    ));
    let app = create_router(state);

    tracing::info!(address = %addr, "Starting Roomcast HTTP server");

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.cancelled().await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await;

    // Serving may also end on error; stop the loops either way.
    shutdown.cancel();
    tasks.close();
    if tokio::time::timeout(config.shutdown_grace(), tasks.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            remaining = tasks.len(),
            "Background tasks still running after grace period"
        );
    }

    served?;
    tracing::info!("Server stopped");
    Ok(())
}
