//! JSON-over-HTTP client for upstream services.
//!
//! A thin wrapper over `reqwest` that joins a base URL with an endpoint path,
//! issues a GET, and decodes the JSON body of a 200. Upstream 4xx/5xx responses are
//! expected to carry `{"error": "<message>"}`; that message is surfaced in
//! [`HttpClientError::Api`]. Transport and decode failures each collapse into
//! a single error value.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by [`HttpClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpClientError {
    /// The underlying client could not be built.
    #[error("HTTP client configuration error: {0}")]
    Configuration(String),

    /// The request never produced a response (DNS, connect, timeout).
    #[error("GET request failed: {0}")]
    Transport(String),

    /// Upstream answered 4xx/5xx with a structured error body.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the `error` field of the response body.
        message: String,
    },

    /// Upstream answered with a status other than 200 and no usable error body.
    #[error("error response, status: {0}")]
    Status(u16),

    /// The success body was not the expected JSON shape.
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// Structured error body returned by upstream services.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Generic client for JSON REST requests against one base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpClient {
    /// Create a client for `base_url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::Configuration` if the TLS backend or client
    /// cannot be initialized.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, HttpClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| HttpClientError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Base URL all endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for `endpoint`.
    #[must_use]
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// GET `endpoint` and decode the JSON response into `T`.
    ///
    /// # Errors
    ///
    /// - `Transport` - no response was received
    /// - `Api` - 4xx/5xx with a `{"error": ...}` body
    /// - `Status` - any other status than 200, including other 2xx
    /// - `Decode` - 200 but the body is not a valid `T`
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, HttpClientError> {
        let url = self.url_for(endpoint);
        debug!(target: "common.http_client", url = %url, "Sending GET request");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            warn!(target: "common.http_client", url = %url, error = %e, "GET request failed");
            HttpClientError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            warn!(target: "common.http_client", url = %url, error = %e, "Failed to read response body");
            HttpClientError::Transport(e.to_string())
        })?;

        if status != reqwest::StatusCode::OK {
            if status.is_client_error() || status.is_server_error() {
                if let Ok(api_error) = serde_json::from_slice::<ApiErrorBody>(&body) {
                    warn!(
                        target: "common.http_client",
                        url = %url,
                        status = %status,
                        "Upstream returned an error body"
                    );
                    return Err(HttpClientError::Api {
                        status: status.as_u16(),
                        message: api_error.error,
                    });
                }
            }
            warn!(target: "common.http_client", url = %url, status = %status, "Unexpected response status");
            return Err(HttpClientError::Status(status.as_u16()));
        }

        serde_json::from_slice(&body).map_err(|e| {
            warn!(target: "common.http_client", url = %url, error = %e, "Failed to decode response body");
            HttpClientError::Decode(e.to_string())
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
