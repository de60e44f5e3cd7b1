//! Table Cache - HTTP host for the table-backed cache
//!
//! Serves the cache over HTTP and runs the eviction sweeper in the background.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use table_cache::api::{create_router, AppState};
use table_cache::{Config, TableCache};

/// Main entry point for the table cache host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the store and start the cache (connect, arm the sweeper)
/// 4. Serve HTTP on the configured port
/// 5. On SIGINT/SIGTERM stop the cache and shut down gracefully
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "table_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting table cache server");

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "Configuration loaded: connection={}, partition={}, ttl_interval={:?}, port={}",
        config.connection, config.partition, config.ttl_interval, config.server_port
    );
    let port = config.server_port;

    let cache = Arc::new(TableCache::from_config(config).context("failed to open store")?);
    if let Some(sweeper) = cache.sweeper() {
        sweeper.on_collected(|deleted| {
            if deleted > 0 {
                info!(deleted, "expired entries collected");
            }
            Ok(())
        });
        sweeper.on_error(|err| {
            if err.is_fatal() {
                error!(error = %err, "sweeper stopped");
            } else {
                warn!(error = %err, "sweep tick failed");
            }
        });
    }
    cache.start().await.context("failed to start table cache")?;

    let app = create_router(AppState::from_shared(cache.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cache))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the cache.
async fn shutdown_signal(cache: Arc<TableCache>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cache.stop();
    warn!("Table cache stopped");
}
