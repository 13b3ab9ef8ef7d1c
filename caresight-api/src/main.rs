mod http;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use caresight_core::{logging, repository::PgGrantStore, Config};

#[derive(Debug, Parser)]
#[command(name = "caresight-api", about = "Shared-access API server")]
struct Args {
    /// Path to a config file; environment variables override it
    #[arg(long, env = "CARESIGHT_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}");
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize logging; the guard flushes the file appender on drop
    let _log_guard = logging::init_logging(&config.logging)?;

    info!("CareSight API server starting...");
    info!("HTTP address: {}", config.http_address());

    // Initialize database pool
    info!("Connecting to database: {}", config.database_url());
    let pool: sqlx::PgPool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
        .connect(config.database_url())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            anyhow::anyhow!("Database connection failed: {e}")
        })?;

    info!("Database connected successfully");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            anyhow::anyhow!("Migration failed: {e}")
        })?;
    info!("Migrations completed");

    // Grant store and HTTP router
    let store = Arc::new(PgGrantStore::new(pool.clone()));
    let router = http::create_router(store, &config.shared_access, Some(pool)).layer(
        TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_seconds)),
    );
    info!(
        "Shared-access services initialized (cache TTL: {}ms)",
        config.shared_access.cache_ttl_ms
    );

    let http_address = config.http_address();
    let http_addr: std::net::SocketAddr = http_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{http_address}': {e}"))?;

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_addr}: {e}"))?;

    info!("HTTP server listening on {}", http_addr);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
    }

    info!("HTTP server shut down gracefully");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
