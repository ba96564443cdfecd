//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! This endpoint is unauthenticated to allow Prometheus to scrape metrics.
//! Labels carry only bounded outcome and status values; no key IDs,
//! subjects or token contents.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus-formatted metrics for scraping.
///
/// # Response
///
/// ```text
/// # TYPE ms_auth_requests_total counter
/// ms_auth_requests_total{outcome="accepted"} 42
/// ```
#[tracing::instrument(skip_all, name = "ms.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
