//! Measurements Service Library
//!
//! Bearer-token gate for the measurements API. Tokens are RSA-signed JWTs
//! issued by an external identity issuer that publishes its verification
//! keys as a JWKS document and rotates them over time.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/authenticator.rs -> auth/keystore.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key store, claims validation, backoff, token authenticator
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication middleware
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
