use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use queue::{CommandQueue, CommandStore, MemoryStore, RedisStore};

mod app;
mod config;
mod error;
mod extractors;
mod jobs;
mod middleware;
mod routes;
mod services;

use jobs::{JobScheduler, ReclaimExpiredJob};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging
    middleware::logging::init_logging(&config.logging);

    info!("Starting FleetQ API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the Prometheus recorder before anything records a metric
    middleware::init_metrics();

    // Connect the command store
    let store: Arc<dyn CommandStore> = match config.store.backend.as_str() {
        "redis" => {
            info!("Using Redis command store");
            Arc::new(RedisStore::connect(&config.store.redis_url).await?)
        }
        _ => {
            info!("Using in-memory command store");
            Arc::new(MemoryStore::new())
        }
    };

    let queue = CommandQueue::new(store, config.queue_config());

    // Session verification (static token table or external HTTP service)
    let sessions = services::sessions::build_verifier(&config.sessions)?;

    // Background jobs
    let mut scheduler = JobScheduler::new();
    scheduler.register(ReclaimExpiredJob::new(
        queue.clone(),
        config.queue.sweep_interval_secs,
    ));
    scheduler.start();

    // Build application
    let app = app::create_app(config.clone(), queue, sessions);

    // Start server
    let addr = config.socket_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop background jobs after the server drains
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
