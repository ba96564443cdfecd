//! Common utilities shared across the measurements service crates.

#![warn(clippy::pedantic)]

/// Module for JWT header decoding and size limits
pub mod jwt;

/// Module for the JSON-over-HTTP client used to reach upstream services
pub mod http_client;
