//! Authentication integration tests.
//!
//! Runs the full router against a mocked issuer JWKS endpoint and checks the
//! HTTP surface of accepted and rejected requests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use common::http_client::HttpClient;
use measurements_service::auth::{BackoffPolicy, HttpJwksSource, KeyStore, TokenAuthenticator};
use measurements_service::config::Config;
use measurements_service::errors::WWW_AUTHENTICATE_VALUE;
use measurements_service::observability::metrics::init_metrics_recorder;
use measurements_service::routes::{self, AppState};
use ms_test_utils::{jwks_document, TestClaimsBuilder, TestSigningKey};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
    OnceLock::new();

fn get_test_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

/// Test server with a mocked issuer.
struct TestAuthServer {
    addr: SocketAddr,
    _server_handle: JoinHandle<()>,
    mock_server: MockServer,
    key_store: Arc<KeyStore>,
    signing_key: TestSigningKey,
}

impl TestAuthServer {
    async fn spawn() -> Result<Self> {
        let mock_server = MockServer::start().await;
        let signing_key = TestSigningKey::primary("issuer-key-1");

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_document(&[signing_key.jwk_json()])),
            )
            .mount(&mock_server)
            .await;

        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("APP_ENV".to_string(), "test".to_string()),
            ("ISSUER_BASE_URL".to_string(), mock_server.uri()),
            ("AUTH_MAX_RETRIES".to_string(), "2".to_string()),
            ("AUTH_BACKOFF_UNIT_MS".to_string(), "0".to_string()),
            ("HTTP_TIMEOUT_SECONDS".to_string(), "5".to_string()),
        ]);
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let http_client = HttpClient::new(config.issuer_base_url.clone(), config.http_timeout)?;
        let source = HttpJwksSource::new(http_client, config.jwks_path.clone());
        let key_store = Arc::new(KeyStore::new(Arc::new(source)));
        key_store.refresh().await?;

        let authenticator = Arc::new(TokenAuthenticator::with_policy(
            Arc::clone(&key_store),
            config.max_retries,
            BackoffPolicy::new(config.backoff_unit),
        ));
        let state = Arc::new(AppState {
            config,
            authenticator,
        });
        let app = routes::build_routes(state, get_test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let server_handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            _server_handle: server_handle,
            mock_server,
            key_store,
            signing_key,
        })
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    async fn get_me(&self, authorization: Option<&str>) -> Result<reqwest::Response> {
        let mut request = reqwest::Client::new().get(format!("{}/api/v1/me", self.url()));
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }
        Ok(request.send().await?)
    }

    /// Replace the published key set.
    async fn publish(&self, keys: &[serde_json::Value]) {
        self.mock_server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.mock_server)
            .await;
    }

    /// Make the issuer fail every JWKS request.
    async fn fail_jwks(&self) {
        self.mock_server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(serde_json::json!({"error": "issuer maintenance"})),
            )
            .mount(&self.mock_server)
            .await;
    }
}

impl Drop for TestAuthServer {
    fn drop(&mut self) {
        self._server_handle.abort();
    }
}

async fn assert_unauthorized(response: reqwest::Response, expected_message: &str) -> Result<()> {
    assert_eq!(response.status(), 401);
    assert_eq!(
        response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok()),
        Some(WWW_AUTHENTICATE_VALUE)
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body, serde_json::json!({ "error": expected_message }));
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_me_endpoint_requires_auth() -> Result<()> {
    let server = TestAuthServer::spawn().await?;

    let response = server.get_me(None).await?;

    assert_unauthorized(response, "Missing Authorization header").await
}

#[tokio::test]
async fn test_me_endpoint_rejects_invalid_auth_format() -> Result<()> {
    let server = TestAuthServer::spawn().await?;

    let response = server.get_me(Some("Basic abc123")).await?;

    assert_unauthorized(response, "Invalid Authorization header format").await
}

#[tokio::test]
async fn test_me_endpoint_rejects_bare_bearer() -> Result<()> {
    let server = TestAuthServer::spawn().await?;

    let response = server.get_me(Some("Bearer")).await?;

    assert_unauthorized(response, "Invalid Authorization header format").await
}

#[tokio::test]
async fn test_me_endpoint_with_valid_token() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    let token = server.signing_key.sign(
        &TestClaimsBuilder::new()
            .for_user("alice")
            .with_scope("measurements:read")
            .build(),
    );

    let response = server.get_me(Some(&format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["sub"], "alice");
    assert_eq!(body["scope"], "measurements:read");
    assert!(body["exp"].is_i64());
    assert!(body["iat"].is_i64());

    Ok(())
}

#[tokio::test]
async fn test_me_endpoint_rejects_expired_token() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    let token = server
        .signing_key
        .sign(&TestClaimsBuilder::new().expires_in(-3600).build());

    let response = server.get_me(Some(&format!("Bearer {token}"))).await?;

    assert_unauthorized(response, "token is expired").await
}

#[tokio::test]
async fn test_me_endpoint_rejects_future_iat() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    let now = chrono::Utc::now().timestamp();
    let token = server
        .signing_key
        .sign(&TestClaimsBuilder::new().issued_at(now + 3600).build());

    let response = server.get_me(Some(&format!("Bearer {token}"))).await?;

    assert_unauthorized(
        response,
        "token issued in the future, possible clock skew issue",
    )
    .await
}

#[tokio::test]
async fn test_me_endpoint_accepts_token_from_rotated_key() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    let rotated = TestSigningKey::rotated("issuer-key-2");
    server
        .publish(&[server.signing_key.jwk_json(), rotated.jwk_json()])
        .await;

    let token = rotated.sign(&TestClaimsBuilder::new().for_user("bob").build());
    let response = server.get_me(Some(&format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["sub"], "bob");
    assert_eq!(server.key_store.key_count().await, 2);

    Ok(())
}

#[tokio::test]
async fn test_me_endpoint_ignores_malformed_jwks_entries() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    let rotated = TestSigningKey::rotated("issuer-key-2");
    server
        .publish(&[
            serde_json::json!({"kid": 42, "x5c": ["AAAA"]}),
            rotated.jwk_json(),
            serde_json::json!({"kid": "issuer-key-3", "x5c": "not-an-array"}),
        ])
        .await;

    let token = rotated.sign(&TestClaimsBuilder::new().for_user("carol").build());
    let response = server.get_me(Some(&format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["sub"], "carol");
    assert_eq!(server.key_store.key_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_me_endpoint_rejects_unknown_key_after_retries() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    let stranger = TestSigningKey::rotated("unpublished-key");
    let token = stranger.sign(&TestClaimsBuilder::new().build());

    let response = server.get_me(Some(&format!("Bearer {token}"))).await?;

    assert_unauthorized(response, "failed to validate token after [2] retries").await?;

    // Startup fetch plus two rotation refreshes
    let requests = server.mock_server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_me_endpoint_hides_issuer_failure_details() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    server.fail_jwks().await;

    let stranger = TestSigningKey::rotated("unpublished-key");
    let token = stranger.sign(&TestClaimsBuilder::new().build());
    let response = server.get_me(Some(&format!("Bearer {token}"))).await?;

    assert_unauthorized(response, "failed to fetch verification keys").await?;

    // Known keys still verify from the previous snapshot
    let ok = server.signing_key.sign(&TestClaimsBuilder::new().build());
    let response = server.get_me(Some(&format!("Bearer {ok}"))).await?;
    assert_eq!(response.status(), 200);

    Ok(())
}

#[tokio::test]
async fn test_health_reports_key_count() -> Result<()> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(
        body,
        serde_json::json!({"status": "healthy", "environment": "test", "keys": 1})
    );

    Ok(())
}

#[tokio::test]
async fn test_ready_reports_ready_with_keys() -> Result<()> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");

    Ok(())
}

#[tokio::test]
async fn test_ready_unavailable_when_snapshot_is_empty() -> Result<()> {
    let server = TestAuthServer::spawn().await?;
    server.publish(&[]).await;
    server.key_store.refresh().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"], "Service temporarily unavailable");

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<()> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), 200);

    Ok(())
}

#[tokio::test]
async fn test_startup_refresh_fails_when_issuer_is_down() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let http_client = HttpClient::new(mock_server.uri(), Duration::from_secs(5))?;
    let key_store = KeyStore::new(Arc::new(HttpJwksSource::new(http_client, JWKS_PATH)));

    assert!(key_store.refresh().await.is_err());
    assert_eq!(key_store.key_count().await, 0);

    Ok(())
}
