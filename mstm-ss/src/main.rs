//! mstm-ss (Streaming Service) - Main entry point
//!
//! Serves audio by media id with HTTP range support and publishes playback
//! events to the message broker.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mstm_ss::config::{Args, StreamingConfig};
use mstm_ss::events::{AmqpEventSink, EventDispatcher, EventSink, LogEventSink};
use mstm_ss::locator::PgSongLocator;
use mstm_ss::{build_router, AppState, StreamSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = StreamingConfig::load(&args).context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mstm_ss={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting MSTM Streaming Service (mstm-ss) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &config.source_file {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let database_url = config
        .database_url
        .as_deref()
        .context("database_url is required (--database-url or DATABASE_URL)")?;
    let content_base = config
        .content_base_path
        .clone()
        .context("content_base_path is required (--content-base-path or CONTENT_BASE_PATH)")?;

    info!("Content base path: {}", content_base.display());
    let locator = Arc::new(
        PgSongLocator::connect_lazy(database_url, content_base)
            .context("Invalid database URL")?,
    );

    let sink: Arc<dyn EventSink> = match &config.amqp_url {
        Some(url) => {
            info!(
                "Publishing playback events to exchange '{}'",
                config.events.exchange
            );
            Arc::new(AmqpEventSink::new(
                url.clone(),
                config.events.exchange.clone(),
                config.events.queue.clone(),
            ))
        }
        None => {
            warn!("No broker URL configured, playback events will only be logged");
            Arc::new(LogEventSink)
        }
    };
    let dispatcher = EventDispatcher::new(sink, config.publish_timeout());

    let mut state = AppState::new(
        locator.clone(),
        config.source_backend.opener(),
        dispatcher.clone(),
        StreamSettings::from(&config),
    );
    match &config.jwt_secret {
        Some(secret) => {
            state = state.with_jwt_secret(secret.as_bytes());
            info!("✓ Bearer token authentication enabled");
        }
        None => info!("API authentication disabled (no jwt_secret)"),
    }

    info!(
        "Source backend: {}, chunk size {} bytes, play threshold {}, policy {:?}",
        config.source_backend,
        config.chunk_size,
        config.play_threshold,
        config.trigger_policy
    );

    let app = build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("mstm-ss listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // In-flight publishes are abandoned with the connection
    dispatcher.shutdown().await;
    locator.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
