//! Session Controller
//!
//! HTTP and WebSocket service for live course sessions.

#![allow(clippy::too_many_lines)] // main.rs orchestrates startup

use common::config::ObservabilityConfig;
use session_controller::config::Config;
use session_controller::observability::metrics::init_metrics_recorder;
use session_controller::repositories::{InMemorySessionStore, PgSessionStore, SessionStore};
use session_controller::routes::{self, AppState};
use session_controller::services::{HttpIdentityVerifier, HttpMeetingProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first: it decides the log format
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&ObservabilityConfig::default());
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    init_tracing(&config.observability);

    info!("Starting Session Controller");
    info!(
        bind_address = %config.bind_address,
        meeting_provider_url = %config.meeting_provider_url,
        provider_timeout_seconds = config.provider_timeout_seconds,
        room_outbound_buffer = config.room_outbound_buffer,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    let store: Arc<dyn SessionStore> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(20)
                .min_connections(2)
                .acquire_timeout(Duration::from_secs(5))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect(database_url)
                .await
                .map_err(|e| {
                    error!("Failed to connect to database: {}", e);
                    e
                })?;

            sqlx::migrate!("../../migrations")
                .run(&db_pool)
                .await
                .map_err(|e| {
                    error!("Failed to run migrations: {}", e);
                    e
                })?;
            info!("Database connection established");
            Arc::new(PgSessionStore::new(db_pool))
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory session store; data is not durable");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let request_timeout = Duration::from_secs(config.provider_timeout_seconds);
    let provider = Arc::new(HttpMeetingProvider::new(
        config.meeting_provider_url.clone(),
        request_timeout,
    )?);
    let identity = Arc::new(HttpIdentityVerifier::new(
        config.auth_verify_url.clone(),
        request_timeout,
    )?);

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let (state, registry_task) = AppState::new(config, store, provider, identity);
    let state = Arc::new(state);
    let rooms = state.rooms.clone();

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Session Controller listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    // Close every room; sockets still attached are told to stop.
    rooms.shutdown();
    if let Err(e) = registry_task.await {
        error!("Room registry ended abnormally: {}", e);
    }

    info!("Session Controller shutdown complete");

    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| observability.log_level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
