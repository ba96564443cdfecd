//! Authentication middleware for protected routes.
//!
//! Passes the Authorization header to the token authenticator and injects the
//! accepted claims into request extensions.

use crate::auth::{AuthError, TokenAuthenticator};
use crate::errors::ApiError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<TokenAuthenticator>,

    /// Time budget for one authentication, below the router's request timeout.
    pub deadline: Duration,
}

/// Authentication middleware that validates bearer tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if the token is
///   missing or rejected, or if key rotation retries outlast `deadline`
/// - Continues to next handler with claims in extensions if the token is valid
#[instrument(skip(state, req, next), name = "ms.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let authorization = match req.headers().get(header::AUTHORIZATION) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| {
            tracing::debug!(target: "ms.middleware.auth", "Authorization header is not visible ASCII");
            AuthError::MalformedHeader("Invalid Authorization header format".to_string())
        })?),
    };

    let claims = state
        .authenticator
        .authenticate_within(authorization, state.deadline)
        .await?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
