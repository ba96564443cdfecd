//! Authentication module for the measurements service.
//!
//! This module verifies bearer tokens against the issuer's rotating JWKS.
//!
//! # Components
//!
//! - `keystore` - Snapshot of issuer verification keys, refreshed on demand
//! - `claims` - Typed claims and time-bound claim validation
//! - `backoff` - Linear delay between rotation retries
//! - `authenticator` - Bearer parsing, signature verification, retry-on-rotation
//! - `error` - Rejection kinds surfaced to the request pipeline

pub mod authenticator;
pub mod backoff;
pub mod claims;
pub mod error;
pub mod keystore;

pub use authenticator::{AuthDecision, TokenAuthenticator};
pub use backoff::BackoffPolicy;
pub use claims::{validate_claims, Claims, ClaimsError};
pub use error::AuthError;
pub use keystore::{HttpJwksSource, JwksSource, KeySnapshot, KeyStore, VerificationKey};
