//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating token claims.

use chrono::{Duration, Utc};
use serde_json::{Map, Value};

/// Builder for creating test JWT claims
///
/// Defaults: `exp` one hour from now, `iat` ten seconds ago, no `nbf`.
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_user("alice")
///     .with_scope("measurements:read")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    sub: Option<String>,
    scope: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a new claims builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: Some("test-subject".to_string()),
            scope: None,
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            nbf: None,
            iat: Some((now - Duration::seconds(10)).timestamp()),
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    /// Drop the `exp` claim
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Drop the `iat` claim
    pub fn without_issued_at(mut self) -> Self {
        self.iat = None;
        self
    }

    /// Set not-before timestamp
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    /// Add an arbitrary passthrough claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        if let Some(sub) = self.sub {
            claims.insert("sub".to_string(), Value::from(sub));
        }
        if let Some(scope) = self.scope {
            claims.insert("scope".to_string(), Value::from(scope));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), Value::from(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), Value::from(nbf));
        }
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), Value::from(iat));
        }
        Value::Object(claims)
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestClaimsBuilder::new()
            .for_user("alice")
            .with_scope("measurements:read")
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["scope"], "measurements:read");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
        assert!(claims.get("nbf").is_none());
    }

    #[test]
    fn test_builder_drops_claims() {
        let claims = TestClaimsBuilder::new()
            .without_expiry()
            .without_issued_at()
            .build();

        assert!(claims.get("exp").is_none());
        assert!(claims.get("iat").is_none());
    }

    #[test]
    fn test_builder_default() {
        let claims = TestClaimsBuilder::default().build();
        assert_eq!(claims["sub"], "test-subject");
    }
}
