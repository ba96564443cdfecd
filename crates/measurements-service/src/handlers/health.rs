//! Health check handlers.
//!
//! Provides liveness and readiness probes.

use crate::errors::ApiError;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Response for `/health` and `/ready`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub environment: String,

    /// Number of verification keys in the current snapshot.
    pub keys: usize,
}

/// Liveness probe.
///
/// Always 200 while the process is serving. Reports the key count for
/// diagnostics.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "environment": "dev",
///   "keys": 2
/// }
/// ```
#[instrument(skip_all, name = "ms.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let keys = state.authenticator.key_store().key_count().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        environment: state.config.environment.clone(),
        keys,
    })
}

/// Readiness probe.
///
/// Returns 503 while the key snapshot is empty, since no token could be
/// accepted without a refresh.
#[instrument(skip_all, name = "ms.health.ready")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let keys = state.authenticator.key_store().key_count().await;

    if keys == 0 {
        return Err(ApiError::ServiceUnavailable(
            "key snapshot is empty".to_string(),
        ));
    }

    Ok(Json(HealthResponse {
        status: "ready".to_string(),
        environment: state.config.environment.clone(),
        keys,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // The handlers are exercised against a real router in tests/auth_tests.rs.

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            environment: "dev".to_string(),
            keys: 2,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "healthy", "environment": "dev", "keys": 2})
        );
    }
}
