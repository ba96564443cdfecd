//! Current caller handler.
//!
//! Echoes the accepted claims of the bearer token.

use crate::auth::Claims;
use axum::{Extension, Json};
use tracing::instrument;

/// Handler for GET /api/v1/me
///
/// Requires valid authentication via the auth middleware.
///
/// ## Response
///
/// Returns 200 OK with the verified claims:
///
/// ```json
/// {
///   "sub": "user-123",
///   "scope": "measurements:read",
///   "exp": 1234567890,
///   "iat": 1234567800
/// }
/// ```
#[instrument(skip_all, name = "ms.handlers.me")]
pub async fn get_me(Extension(claims): Extension<Claims>) -> Json<Claims> {
    tracing::debug!(target: "ms.handlers.me", "Returning caller claims");
    Json(claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_me_returns_claims() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "user-123",
            "scope": "measurements:read",
            "exp": 1_234_567_890,
            "iat": 1_234_567_800
        }))
        .unwrap();

        let Json(body) = get_me(Extension(claims.clone())).await;
        assert_eq!(body, claims);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sub"], "user-123");
        assert_eq!(json["exp"], 1_234_567_890);
        assert!(json.get("nbf").is_none());
    }
}
