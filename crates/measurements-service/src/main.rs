//! Measurements Service
//!
//! Entry point for the measurements API. Loads the issuer's verification keys
//! once at startup and serves the authenticated API.

use common::http_client::HttpClient;
use measurements_service::auth::{
    BackoffPolicy, HttpJwksSource, KeyStore, TokenAuthenticator,
};
use measurements_service::config::Config;
use measurements_service::observability::metrics::init_metrics_recorder;
use measurements_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "measurements_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Measurements Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        environment = %config.environment,
        bind_address = %config.bind_address,
        issuer_base_url = %config.issuer_base_url,
        max_retries = config.max_retries,
        backoff_unit_ms = config.backoff_unit.as_millis() as u64,
        auth_deadline_secs = config.auth_deadline.as_secs(),
        "Configuration loaded successfully"
    );

    let backoff = BackoffPolicy::new(config.backoff_unit);
    let worst_case_backoff = backoff.total_delay(config.max_retries);
    if worst_case_backoff >= config.auth_deadline {
        warn!(
            worst_case_backoff_ms = worst_case_backoff.as_millis() as u64,
            auth_deadline_secs = config.auth_deadline.as_secs(),
            "Rotation backoff can outlast the authentication deadline; late retries will be cancelled"
        );
    }

    // Initialize Prometheus metrics recorder before anything records
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Build the issuer client and key store
    let http_client = HttpClient::new(config.issuer_base_url.clone(), config.http_timeout)
        .map_err(|e| {
            error!("Failed to build issuer HTTP client: {}", e);
            e
        })?;
    let source = HttpJwksSource::new(http_client, config.jwks_path.clone());
    let jwks_url = source.url();
    let key_store = Arc::new(KeyStore::new(Arc::new(source)));

    // Initial key fetch; the service cannot authenticate anything without it
    info!(url = %jwks_url, "Fetching issuer verification keys...");
    key_store.refresh().await.map_err(|e| {
        error!(error = ?e, "Failed to fetch issuer verification keys at startup");
        e
    })?;
    let key_count = key_store.key_count().await;
    info!(key_count, "Issuer verification keys loaded");

    let authenticator = Arc::new(TokenAuthenticator::with_policy(
        Arc::clone(&key_store),
        config.max_retries,
        backoff,
    ));

    // Parse bind address before moving config
    let bind_address = config.bind_address.clone();
    let drain_period = config.drain_period;

    // Create application state
    let state = Arc::new(AppState {
        config,
        authenticator,
    });

    // Build application routes
    let app = routes::build_routes(state, metrics_handle);

    // Parse bind address
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Measurements Service listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_period))
    .await?;

    info!("Measurements Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_period: Duration) {
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}
