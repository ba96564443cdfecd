//! Metrics definitions for the measurements service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ms_` prefix for the measurements service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `outcome`: "accepted" plus one value per `AuthError` kind
//! - `status`: 2 values (success, error)
//!
//! Key IDs and subjects are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Authentication spans sleeps between rotation retries, so the
        // upper buckets reach past the default 0+1+2 second backoff
        .set_buckets_for_metric(
            Matcher::Full("ms_auth_duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set auth duration buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("ms_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the outcome of one authentication.
///
/// Metric: `ms_auth_requests_total`, `ms_auth_duration_seconds`
/// Labels: `outcome`
///
/// Duration includes refreshes and backoff sleeps.
pub fn record_auth(outcome: &'static str, duration: Duration) {
    histogram!("ms_auth_duration_seconds").record(duration.as_secs_f64());

    counter!("ms_auth_requests_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one rotation-driven retry (a refresh triggered by a failed attempt).
///
/// Metric: `ms_key_rotation_retries_total`
pub fn record_key_rotation_retry() {
    counter!("ms_key_rotation_retries_total").increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a key snapshot refresh.
///
/// Metric: `ms_jwks_refresh_total`, `ms_jwks_refresh_duration_seconds`
/// Labels: `status` ("success" or "error")
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("ms_jwks_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("ms_jwks_refresh_total",
        "status" => status
    )
    .increment(1);
}

/// Set the number of keys in the current snapshot.
///
/// Metric: `ms_jwks_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_jwks_key_count(count: usize) {
    gauge!("ms_jwks_keys").set(count as f64);
}

// ============================================================================
// Tests
// ============================================================================
