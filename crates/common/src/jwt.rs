//! JWT header utilities shared across measurements service components.
//!
//! This module decodes the protected header of a compact JWT *without*
//! verifying its signature. The decoded header is only used to pick the
//! verification key and to reject unsupported algorithms early.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing decoded here is trusted until the signature has been verified
//! - Token contents are never logged, only their sizes and part counts
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::decode_header;
//!
//! let header = decode_header(token)?;
//! let kid = header.kid.ok_or("missing kid")?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical RSA-signed tokens are well under 2KB. Anything larger is rejected
/// before base64 decoding or any cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while decoding a JWT header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtHeaderError {
    /// Token size exceeds maximum allowed.
    #[error("token exceeds the maximum allowed size")]
    TokenTooLarge,

    /// Token is not made of three dot-separated parts.
    #[error("token is not a compact JWT")]
    MalformedToken,

    /// Header part is not valid base64url JSON.
    #[error("token header could not be decoded")]
    MalformedHeader,
}

// =============================================================================
// Header Type
// =============================================================================

/// The protected header of a compact JWT.
///
/// Only the fields needed for key selection are decoded; everything else in
/// the header is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm (e.g. `RS256`).
    pub alg: String,

    /// Key ID naming the verification key. Empty values are treated as absent.
    #[serde(default, deserialize_with = "deserialize_kid")]
    pub kid: Option<String>,

    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

fn deserialize_kid<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let kid = Option::<String>::deserialize(deserializer)?;
    Ok(kid.filter(|k| !k.is_empty()))
}

// =============================================================================
// Functions
// =============================================================================

/// Decode the header of a compact JWT without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - token does not have exactly three parts
/// - `MalformedHeader` - header is not base64url-encoded JSON with a string `alg`
///   and (if present) a string `kid`
pub fn decode_header(token: &str) -> Result<TokenHeader, JwtHeaderError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtHeaderError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtHeaderError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtHeaderError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtHeaderError::MalformedHeader
    })?;

    serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtHeaderError::MalformedHeader
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_decode_header_valid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-01"}"#);

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, "RS256");
        assert_eq!(header.kid.as_deref(), Some("key-01"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn test_decode_header_without_kid() {
        let token = token_with_header(r#"{"alg":"RS256"}"#);

        let header = decode_header(&token).unwrap();
        assert!(header.kid.is_none());
        assert!(header.typ.is_none());
    }

    #[test]
    fn test_decode_header_empty_kid_is_absent() {
        let token = token_with_header(r#"{"alg":"RS256","kid":""}"#);

        let header = decode_header(&token).unwrap();
        assert!(header.kid.is_none(), "Empty kid should be treated as absent");
    }

    #[test]
    fn test_decode_header_null_kid_is_absent() {
        let token = token_with_header(r#"{"alg":"RS256","kid":null}"#);

        let header = decode_header(&token).unwrap();
        assert!(header.kid.is_none());
    }

    #[test]
    fn test_decode_header_numeric_kid_rejected() {
        let token = token_with_header(r#"{"alg":"RS256","kid":12345}"#);

        assert_eq!(
            decode_header(&token),
            Err(JwtHeaderError::MalformedHeader)
        );
    }

    #[test]
    fn test_decode_header_missing_alg_rejected() {
        let token = token_with_header(r#"{"kid":"key-01"}"#);

        assert_eq!(
            decode_header(&token),
            Err(JwtHeaderError::MalformedHeader)
        );
    }

    #[test]
    fn test_decode_header_wrong_part_count() {
        assert_eq!(decode_header(""), Err(JwtHeaderError::MalformedToken));
        assert_eq!(decode_header("single"), Err(JwtHeaderError::MalformedToken));
        assert_eq!(decode_header("only.two"), Err(JwtHeaderError::MalformedToken));
        assert_eq!(
            decode_header("not.a.valid.jwt"),
            Err(JwtHeaderError::MalformedToken)
        );
    }

    #[test]
    fn test_decode_header_invalid_base64() {
        assert_eq!(
            decode_header("!!!invalid!!!.payload.signature"),
            Err(JwtHeaderError::MalformedHeader)
        );
    }

    #[test]
    fn test_decode_header_invalid_json() {
        let token = token_with_header("not-json");
        assert_eq!(
            decode_header(&token),
            Err(JwtHeaderError::MalformedHeader)
        );
    }

    #[test]
    fn test_decode_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            decode_header(&oversized),
            Err(JwtHeaderError::TokenTooLarge)
        );
    }

    #[test]
    fn test_decode_header_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let payload_len = remaining / 2;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(remaining - payload_len)
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        let header = decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("key"));
    }
}
