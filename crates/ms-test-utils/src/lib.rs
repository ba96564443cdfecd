//! # Measurements Service Test Utilities
//!
//! Shared test utilities for the measurements service token gate.
//!
//! This crate provides:
//! - Fixed RSA and EC certificate fixtures (checked in under `fixtures/`)
//! - Token signing with those fixtures (`TestSigningKey`)
//! - JWKS document builders
//! - Claims builders (`TestClaimsBuilder`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ms_test_utils::*;
//!
//! let key = TestSigningKey::primary("key-01");
//! let token = key.sign(&TestClaimsBuilder::new().for_user("alice").build());
//! let jwks = jwks_document(&[key.jwk_json()]);
//! ```

pub mod crypto_fixtures;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use token_builders::*;
