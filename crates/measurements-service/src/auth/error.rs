//! Authentication rejection kinds.
//!
//! Every variant is terminal for the request that produced it. The HTTP layer
//! maps all of them to 401 and uses the `Display` text as the client-facing
//! message, so variants that carry internal detail keep it out of `Display`.

use crate::auth::claims::ClaimsError;
use thiserror::Error;

/// Why a bearer token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,

    /// Authorization header or token header is not in the expected shape.
    #[error("{0}")]
    MalformedHeader(String),

    /// Token declares a non-RSA signing algorithm.
    #[error("unexpected signing method: {0}")]
    UnsupportedAlgorithm(String),

    /// Token names a key ID that the current snapshot does not contain.
    #[error("key not found in JWKS")]
    UnknownKeyId(String),

    /// Key material for the token's key ID cannot verify it.
    #[error("invalid verification key in JWKS")]
    InvalidCertificate(String),

    #[error("token signature is invalid")]
    SignatureInvalid,

    /// Payload undecodable, wrong claim types, or token too large.
    #[error("token is malformed")]
    MalformedToken(String),

    #[error("token is expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token issued in the future, possible clock skew issue")]
    ClockSkew,

    #[error("missing exp claim")]
    MissingExpiry,

    #[error("missing iat claim")]
    MissingIssuedAt,

    /// The issuer key endpoint could not produce a full snapshot.
    #[error("failed to fetch verification keys")]
    UpstreamFetchFailure(String),

    /// Verification kept failing after this many refreshes.
    #[error("failed to validate token after [{0}] retries")]
    RetriesExhausted(u32),

    #[error("authentication cancelled")]
    Cancelled,
}

impl AuthError {
    /// Stable, bounded label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::MalformedHeader(_) => "malformed_header",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::UnknownKeyId(_) => "unknown_key_id",
            AuthError::InvalidCertificate(_) => "invalid_certificate",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::Expired => "expired",
            AuthError::NotYetValid => "not_yet_valid",
            AuthError::ClockSkew => "clock_skew",
            AuthError::MissingExpiry => "missing_expiry",
            AuthError::MissingIssuedAt => "missing_issued_at",
            AuthError::UpstreamFetchFailure(_) => "upstream_fetch_failure",
            AuthError::RetriesExhausted(_) => "retries_exhausted",
            AuthError::Cancelled => "cancelled",
        }
    }

    /// Whether this failure may be caused by the issuer rotating keys.
    ///
    /// An unknown key ID and a bad signature are treated the same way, so a
    /// forged signature on a known key ID also triggers refreshes.
    pub fn is_rotation_suspect(&self) -> bool {
        matches!(
            self,
            AuthError::UnknownKeyId(_) | AuthError::SignatureInvalid | AuthError::InvalidCertificate(_)
        )
    }
}

impl From<ClaimsError> for AuthError {
    fn from(err: ClaimsError) -> Self {
        match err {
            ClaimsError::MissingExpiry => AuthError::MissingExpiry,
            ClaimsError::Expired => AuthError::Expired,
            ClaimsError::NotYetValid => AuthError::NotYetValid,
            ClaimsError::MissingIssuedAt => AuthError::MissingIssuedAt,
            ClaimsError::ClockSkew => AuthError::ClockSkew,
        }
    }
}
