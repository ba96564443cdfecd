//! Bearer token authentication with retry-on-rotation.
//!
//! Verification order for one request:
//!
//! 1. Parse `Authorization: Bearer <token>`
//! 2. Decode the token header once (algorithm allow-list, `kid` required)
//! 3. Look up the key and verify the signature; on a failure that may be
//!    caused by key rotation, refresh the key store, back off, and retry
//! 4. Validate `exp`, `nbf` and `iat` on the verified claims
//!
//! With `max_retries = N` there are at most `N + 1` verification attempts and
//! at most `N` refreshes. No refresh follows the last attempt.

use crate::auth::backoff::BackoffPolicy;
use crate::auth::claims::{validate_claims, Claims};
use crate::auth::error::AuthError;
use crate::auth::keystore::{KeyStore, VerificationKey};
use crate::observability::metrics;
use common::jwt::{decode_header, JwtHeaderError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default number of rotation retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Result of authenticating one request.
pub type AuthDecision = Result<Claims, AuthError>;

/// Verifies bearer tokens against a shared [`KeyStore`].
pub struct TokenAuthenticator {
    key_store: Arc<KeyStore>,
    backoff: BackoffPolicy,
    max_retries: u32,
}

impl TokenAuthenticator {
    pub fn with_policy(key_store: Arc<KeyStore>, max_retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            key_store,
            backoff,
            max_retries,
        }
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Authenticate the raw `Authorization` header value.
    pub async fn authenticate(&self, authorization: Option<&str>) -> AuthDecision {
        self.authenticate_with_cancel(authorization, &CancellationToken::new())
            .await
    }

    /// Authenticate, giving up with `Cancelled` once `deadline` has passed.
    ///
    /// The deadline cancels the pending refresh or backoff sleep; the
    /// authentication itself still finishes and records its outcome.
    pub async fn authenticate_within(
        &self,
        authorization: Option<&str>,
        deadline: Duration,
    ) -> AuthDecision {
        let cancel = CancellationToken::new();
        let authentication = self.authenticate_with_cancel(authorization, &cancel);
        tokio::pin!(authentication);

        tokio::select! {
            decision = &mut authentication => return decision,
            () = tokio::time::sleep(deadline) => {}
        }

        tracing::warn!(
            target: "ms.auth.authenticator",
            deadline_ms = deadline.as_millis() as u64,
            "Authentication deadline reached, cancelling key refresh"
        );
        cancel.cancel();
        authentication.await
    }

    /// Authenticate, aborting refreshes and backoff sleeps when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] that rejected the token. `Cancelled` is only
    /// returned while refreshing or backing off.
    #[instrument(skip_all, name = "authenticate")]
    pub async fn authenticate_with_cancel(
        &self,
        authorization: Option<&str>,
        cancel: &CancellationToken,
    ) -> AuthDecision {
        let start = Instant::now();
        let decision = self.evaluate(authorization, cancel).await;

        match &decision {
            Ok(claims) => {
                tracing::debug!(target: "ms.auth.authenticator", claims = ?claims, "Token accepted");
                metrics::record_auth("accepted", start.elapsed());
            }
            Err(e) => {
                tracing::debug!(
                    target: "ms.auth.authenticator",
                    reason = e.kind(),
                    error = ?e,
                    "Token rejected"
                );
                metrics::record_auth(e.kind(), start.elapsed());
            }
        }

        decision
    }

    async fn evaluate(&self, authorization: Option<&str>, cancel: &CancellationToken) -> AuthDecision {
        let token = extract_bearer_token(authorization)?;
        let claims = self.verify_with_rotation(token, cancel).await?;
        validate_claims(&claims, chrono::Utc::now().timestamp())?;
        Ok(claims)
    }

    async fn verify_with_rotation(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Claims, AuthError> {
        let (algorithm, kid) = parse_token_header(token)?;

        for attempt in 0..=self.max_retries {
            let outcome = match self.key_store.lookup(&kid).await {
                Some(key) => verify_signature(token, &key, algorithm),
                None => Err(AuthError::UnknownKeyId(kid.clone())),
            };

            match outcome {
                Ok(claims) => {
                    if attempt > 0 {
                        tracing::info!(
                            target: "ms.auth.authenticator",
                            kid = %kid,
                            attempt,
                            "Token verified after key refresh"
                        );
                    }
                    return Ok(claims);
                }
                Err(e) if e.is_rotation_suspect() => {
                    tracing::debug!(
                        target: "ms.auth.authenticator",
                        kid = %kid,
                        attempt,
                        error = ?e,
                        "Verification failed, possible key rotation"
                    );
                }
                Err(e) => return Err(e),
            }

            if attempt == self.max_retries {
                break;
            }

            metrics::record_key_rotation_retry();
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AuthError::Cancelled),
                refreshed = self.key_store.refresh() => refreshed?,
            }

            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(AuthError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        tracing::warn!(
            target: "ms.auth.authenticator",
            kid = %kid,
            retries = self.max_retries,
            "Token verification failed after key refreshes"
        );
        Err(AuthError::RetriesExhausted(self.max_retries))
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly `Bearer` and a non-empty token separated by a
/// single space.
///
/// # Errors
///
/// - `MissingHeader` - absent or empty header
/// - `MalformedHeader` - any other shape
pub fn extract_bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = match authorization {
        None | Some("") => return Err(AuthError::MissingHeader),
        Some(value) => value,
    };

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(*token),
        _ => Err(AuthError::MalformedHeader(
            "Invalid Authorization header format".to_string(),
        )),
    }
}

/// Decode the token header and return the signing algorithm and key ID.
fn parse_token_header(token: &str) -> Result<(Algorithm, String), AuthError> {
    let header = decode_header(token).map_err(|e| match e {
        JwtHeaderError::TokenTooLarge | JwtHeaderError::MalformedToken => {
            AuthError::MalformedToken(e.to_string())
        }
        JwtHeaderError::MalformedHeader => AuthError::MalformedHeader(e.to_string()),
    })?;

    let algorithm = match header.alg.as_str() {
        "RS256" => Algorithm::RS256,
        "RS384" => Algorithm::RS384,
        "RS512" => Algorithm::RS512,
        other => {
            tracing::debug!(target: "ms.auth.authenticator", alg = %other, "Rejected token algorithm");
            return Err(AuthError::UnsupportedAlgorithm(other.to_string()));
        }
    };

    let kid = header.kid.ok_or_else(|| {
        AuthError::MalformedHeader("missing kid in token header".to_string())
    })?;

    Ok((algorithm, kid))
}

/// Verify the signature with `key` and decode the claims.
///
/// Time-based claims are not checked here.
fn verify_signature(
    token: &str,
    key: &VerificationKey,
    algorithm: Algorithm,
) -> Result<Claims, AuthError> {
    let decoding_key = match key {
        VerificationKey::Rsa(decoding_key) => decoding_key,
        VerificationKey::Unsupported { algorithm } => {
            return Err(AuthError::InvalidCertificate(format!(
                "public key algorithm {algorithm} is not RSA"
            )));
        }
    };

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::Crypto(_) => AuthError::InvalidCertificate(e.to_string()),
            _ => AuthError::MalformedToken(e.to_string()),
        })
}
