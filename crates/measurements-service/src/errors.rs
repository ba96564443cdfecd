//! Measurements service HTTP error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. The body
//! is always `{"error": "<message>"}`. Messages that could leak internal
//! details are replaced with generic text; the details are logged.

use crate::auth::AuthError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Value of the `WWW-Authenticate` header on every 401.
pub const WWW_AUTHENTICATE_VALUE: &str =
    "Bearer realm=\"measurements-service\", error=\"invalid_token\"";

/// Measurements service error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 Unauthorized
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthorized(_) => 401,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized(err) => {
                if let AuthError::UpstreamFetchFailure(detail) = err {
                    // Log actual error server-side, return generic message to client
                    tracing::warn!(
                        target: "ms.errors",
                        error = %detail,
                        "Rejecting request: verification keys unavailable"
                    );
                }
                (StatusCode::UNAUTHORIZED, err.to_string())
            }
            ApiError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "ms.errors", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
        };

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_VALUE),
            );
        }

        response
    }
}
