//! Middleware for the measurements service.
//!
//! # Components
//!
//! - `auth` - Authentication middleware for protected routes

pub mod auth;

pub use auth::{require_auth, AuthState};
