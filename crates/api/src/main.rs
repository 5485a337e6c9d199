// API server clippy configuration
#![allow(clippy::needless_borrows_for_generic_args)]

//! Orgsync API Server
//!
//! Keeps identity-provider organizations and billing-provider customers in
//! step, and mirrors subscription state into organization metadata.

use std::sync::Arc;
use std::time::Duration;

use orgsync_api::{create_router, AppState, Config, LogFormat};
use orgsync_billing::{
    ClerkClient, EventDedupCache, PgCorrelationStore, StripeClient, SubscriptionAccess,
    WebhookDispatcher, WebhookHandler,
};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,orgsync_api=debug,orgsync_billing=debug".into());
    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!("Starting Orgsync API Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Database connection established");

    let correlations = Arc::new(PgCorrelationStore::new(pool.clone()));
    correlations.run_migrations().await?;

    // Background dedup sweep, stopped on shutdown
    let shutdown = CancellationToken::new();
    let dedup = Arc::new(EventDedupCache::with_window(config.dedup_window));
    let sweeper = dedup.spawn_sweeper(config.dedup_sweep_interval, shutdown.clone());

    let identity = Arc::new(ClerkClient::new(config.clerk.clone()));
    let billing = Arc::new(StripeClient::new(config.stripe.clone()));

    let handler = Arc::new(WebhookHandler::new(
        dedup.clone(),
        correlations.clone(),
        identity.clone(),
        billing,
    ));
    let dispatcher = Arc::new(WebhookDispatcher::start(handler, config.dispatcher));

    let access = SubscriptionAccess::new(identity, correlations);

    let addr = config.socket_addr()?;
    let state = AppState::new(config, dedup, dispatcher.clone(), access);
    let app = create_router(state).layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests are done; finish queued events before closing the pool
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Dedup sweeper did not stop cleanly");
    }
    dispatcher.shutdown().await;
    pool.close().await;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
