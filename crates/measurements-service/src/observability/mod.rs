//! Observability module for the measurements service.
//!
//! Provides metrics definitions and instrumentation helpers.

pub mod metrics;
