//! JWT claims structure and time-bound claim validation.
//!
//! `exp`, `nbf` and `iat` are extracted as typed NumericDate values. A claim
//! of the wrong JSON type fails deserialization instead of being treated as
//! absent. Every other claim is passed through untouched in `extra`.
//!
//! The `sub` claim is redacted in Debug output to prevent exposure in logs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Claims of a token whose signature has been verified.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiration timestamp (Unix epoch seconds).
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,

    /// Application claims, not interpreted by the gate.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Custom Debug implementation that redacts the `sub` claim.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extra_keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("extra_claims", &extra_keys)
            .finish()
    }
}

impl Claims {
    /// The `sub` claim, if present and a string.
    pub fn subject(&self) -> Option<&str> {
        self.extra.get("sub").and_then(Value::as_str)
    }

    /// A passthrough claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// Time-bound claim failures, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("missing exp claim")]
    MissingExpiry,

    #[error("token is expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("missing iat claim")]
    MissingIssuedAt,

    #[error("token issued in the future")]
    ClockSkew,
}

/// Validate `exp`, `nbf` and `iat` against `now` (Unix epoch seconds).
///
/// Checks run in the order exp, nbf, iat and the first failure wins.
/// `now == exp` is still valid; `now == nbf` and `now == iat` are valid too.
///
/// # Errors
///
/// Returns the first failing [`ClaimsError`].
pub fn validate_claims(claims: &Claims, now: i64) -> Result<(), ClaimsError> {
    let exp = claims.exp.ok_or(ClaimsError::MissingExpiry)?;
    if now > exp {
        tracing::debug!(target: "ms.auth.claims", exp, now, "Token rejected: expired");
        return Err(ClaimsError::Expired);
    }

    if let Some(nbf) = claims.nbf {
        if now < nbf {
            tracing::debug!(target: "ms.auth.claims", nbf, now, "Token rejected: not yet valid");
            return Err(ClaimsError::NotYetValid);
        }
    }

    let iat = claims.iat.ok_or(ClaimsError::MissingIssuedAt)?;
    if now < iat {
        tracing::debug!(target: "ms.auth.claims", iat, now, "Token rejected: issued in the future");
        return Err(ClaimsError::ClockSkew);
    }

    Ok(())
}

/// NumericDate (RFC 7519 §2): a JSON number of seconds, possibly fractional.
mod numeric_date {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumericDate {
        Int(i64),
        Float(f64),
    }

    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    const MAX_SECONDS: f64 = 9_223_372_036_854_775_807.0;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<NumericDate>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumericDate::Int(secs)) => Ok(Some(secs)),
            Some(NumericDate::Float(secs)) => {
                if secs.is_finite() && secs >= -MAX_SECONDS && secs < MAX_SECONDS {
                    #[allow(clippy::cast_possible_truncation)]
                    let truncated = secs.trunc() as i64;
                    Ok(Some(truncated))
                } else {
                    Err(D::Error::custom("NumericDate out of range"))
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn claims(exp: Option<i64>, nbf: Option<i64>, iat: Option<i64>) -> Claims {
        Claims {
            exp,
            nbf,
            iat,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_valid_claims() {
        let c = claims(Some(NOW + 3600), None, Some(NOW - 10));
        assert_eq!(validate_claims(&c, NOW), Ok(()));
    }

    #[test]
    fn test_exp_equal_to_now_is_not_expired() {
        let c = claims(Some(NOW), None, Some(NOW - 10));
        assert_eq!(validate_claims(&c, NOW), Ok(()));
    }

    #[test]
    fn test_exp_one_second_ago_is_expired() {
        let c = claims(Some(NOW - 1), None, Some(NOW - 10));
        assert_eq!(validate_claims(&c, NOW), Err(ClaimsError::Expired));
    }

    #[test]
    fn test_missing_exp() {
        let c = claims(None, None, Some(NOW));
        assert_eq!(validate_claims(&c, NOW), Err(ClaimsError::MissingExpiry));
    }

    #[test]
    fn test_nbf_in_future() {
        let c = claims(Some(NOW + 60), Some(NOW + 1), Some(NOW));
        assert_eq!(validate_claims(&c, NOW), Err(ClaimsError::NotYetValid));
    }

    #[test]
    fn test_nbf_equal_to_now_is_valid() {
        let c = claims(Some(NOW + 60), Some(NOW), Some(NOW));
        assert_eq!(validate_claims(&c, NOW), Ok(()));
    }

    #[test]
    fn test_missing_iat() {
        let c = claims(Some(NOW + 60), None, None);
        assert_eq!(validate_claims(&c, NOW), Err(ClaimsError::MissingIssuedAt));
    }

    #[test]
    fn test_iat_in_future_is_clock_skew() {
        let c = claims(Some(NOW + 60), None, Some(NOW + 1));
        assert_eq!(validate_claims(&c, NOW), Err(ClaimsError::ClockSkew));
    }

    #[test]
    fn test_expired_wins_over_other_failures() {
        // Expired, not yet valid, and missing iat all at once
        let c = claims(Some(NOW - 1), Some(NOW + 100), None);
        assert_eq!(validate_claims(&c, NOW), Err(ClaimsError::Expired));
    }

    #[test]
    fn test_nbf_checked_before_iat() {
        let c = claims(Some(NOW + 60), Some(NOW + 30), None);
        assert_eq!(validate_claims(&c, NOW), Err(ClaimsError::NotYetValid));
    }

    #[test]
    fn test_deserialize_integer_and_float_dates() {
        let c: Claims =
            serde_json::from_value(json!({"exp": 1_700_000_100.9, "iat": 1_700_000_000})).unwrap();
        assert_eq!(c.exp, Some(1_700_000_100));
        assert_eq!(c.iat, Some(1_700_000_000));
        assert_eq!(c.nbf, None);
    }

    #[test]
    fn test_deserialize_string_date_is_an_error_not_absent() {
        let result = serde_json::from_value::<Claims>(json!({"exp": "1700000000", "iat": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_null_date_is_absent() {
        let c: Claims = serde_json::from_value(json!({"exp": null, "iat": 1})).unwrap();
        assert_eq!(c.exp, None);
    }

    #[test]
    fn test_deserialize_keeps_passthrough_claims() {
        let c: Claims = serde_json::from_value(json!({
            "exp": 2, "iat": 1, "sub": "user-1", "scope": "read", "org": {"id": 7}
        }))
        .unwrap();

        assert_eq!(c.subject(), Some("user-1"));
        assert_eq!(c.get("scope"), Some(&json!("read")));
        assert_eq!(c.get("org"), Some(&json!({"id": 7})));
        assert!(c.get("exp").is_none(), "registered claims are not duplicated");
    }

    #[test]
    fn test_claims_debug_redacts_sub() {
        let mut extra = Map::new();
        extra.insert("sub".to_string(), json!("secret-user-id"));
        let c = Claims {
            exp: Some(2),
            nbf: None,
            iat: Some(1),
            extra,
        };

        let debug_str = format!("{:?}", c);
        assert!(!debug_str.contains("secret-user-id"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_serialization_omits_absent_dates() {
        let c = claims(Some(2), None, Some(1));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, json!({"exp": 2, "iat": 1}));
    }
}
