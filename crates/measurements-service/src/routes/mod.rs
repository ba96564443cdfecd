//! HTTP routes for the measurements service.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenAuthenticator;
use crate::config::{Config, REQUEST_TIMEOUT_SECONDS};
use crate::handlers;
use crate::middleware::{require_auth, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Token authenticator; owns the shared key store.
    pub authenticator: Arc<TokenAuthenticator>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe with key count - public
/// - `/ready` - Readiness probe (non-empty key snapshot) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/api/v1/me` - Caller claims - requires authentication
/// - TraceLayer for request logging
/// - 30 second request timeout; authentication gives up earlier, at
///   `config.auth_deadline`, so rejected requests still get a 401
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        authenticator: Arc::clone(&state.authenticator),
        deadline: state.config.auth_deadline,
    });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(Arc::clone(&state));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/api/v1/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            REQUEST_TIMEOUT_SECONDS,
        )))
}
