//! Measurements service configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; numeric values are range-checked at startup.

use crate::auth::authenticator::DEFAULT_MAX_RETRIES;
use crate::auth::backoff::DEFAULT_BACKOFF_UNIT;
use crate::auth::keystore::DEFAULT_JWKS_PATH;
use common::http_client::DEFAULT_HTTP_TIMEOUT;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default issuer base URL.
pub const DEFAULT_ISSUER_BASE_URL: &str = "http://localhost:8082";

/// Upper bound for `AUTH_MAX_RETRIES`.
pub const MAX_AUTH_RETRIES: u32 = 10;

/// Upper bound for `AUTH_BACKOFF_UNIT_MS`.
pub const MAX_BACKOFF_UNIT_MS: u64 = 60_000;

/// Upper bound for `HTTP_TIMEOUT_SECONDS`.
pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 120;

/// Whole-request timeout applied by the router.
pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Default time one authentication may spend refreshing and backing off.
pub const DEFAULT_AUTH_DEADLINE_SECONDS: u64 = 20;

/// Measurements service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Deployment environment name, reported by `/health`.
    pub environment: String,

    /// Issuer base URL, without trailing slash requirements.
    pub issuer_base_url: String,

    /// Path of the JWKS document on the issuer.
    pub jwks_path: String,

    /// Key refreshes allowed per authentication.
    pub max_retries: u32,

    /// Unit of the linear backoff between retries.
    pub backoff_unit: Duration,

    /// Timeout for requests to the issuer.
    pub http_timeout: Duration,

    /// Budget for one authentication. Must stay below the request timeout
    /// so a slow rotation still ends in a 401.
    pub auth_deadline: Duration,

    /// How long to keep serving after a shutdown signal.
    pub drain_period: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid issuer URL configuration: {0}")]
    InvalidIssuerUrl(String),

    #[error("Invalid JWKS path configuration: {0}")]
    InvalidJwksPath(String),

    #[error("Invalid retry configuration: {0}")]
    InvalidMaxRetries(String),

    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoffUnit(String),

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),

    #[error("Invalid authentication deadline configuration: {0}")]
    InvalidAuthDeadline(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let environment = vars
            .get("APP_ENV")
            .cloned()
            .unwrap_or_else(|| "dev".to_string());

        let issuer_base_url = vars
            .get("ISSUER_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ISSUER_BASE_URL.to_string());
        if issuer_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidIssuerUrl(
                "ISSUER_BASE_URL must not be empty".to_string(),
            ));
        }

        let jwks_path = vars
            .get("AUTH_JWKS_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_JWKS_PATH.to_string());
        if !jwks_path.starts_with('/') {
            return Err(ConfigError::InvalidJwksPath(format!(
                "AUTH_JWKS_PATH must start with '/', got '{jwks_path}'"
            )));
        }

        let max_retries = if let Some(value_str) = vars.get("AUTH_MAX_RETRIES") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidMaxRetries(format!(
                    "AUTH_MAX_RETRIES must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value > MAX_AUTH_RETRIES {
                return Err(ConfigError::InvalidMaxRetries(format!(
                    "AUTH_MAX_RETRIES must not exceed {MAX_AUTH_RETRIES}, got {value}"
                )));
            }

            value
        } else {
            DEFAULT_MAX_RETRIES
        };

        let backoff_unit = if let Some(value_str) = vars.get("AUTH_BACKOFF_UNIT_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidBackoffUnit(format!(
                    "AUTH_BACKOFF_UNIT_MS must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value > MAX_BACKOFF_UNIT_MS {
                return Err(ConfigError::InvalidBackoffUnit(format!(
                    "AUTH_BACKOFF_UNIT_MS must not exceed {MAX_BACKOFF_UNIT_MS}, got {value}"
                )));
            }

            Duration::from_millis(value)
        } else {
            DEFAULT_BACKOFF_UNIT
        };

        let http_timeout = if let Some(value_str) = vars.get("HTTP_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidHttpTimeout(format!(
                    "HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 || value > MAX_HTTP_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidHttpTimeout(format!(
                    "HTTP_TIMEOUT_SECONDS must be between 1 and {MAX_HTTP_TIMEOUT_SECONDS}, got {value}"
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_HTTP_TIMEOUT
        };

        let auth_deadline = if let Some(value_str) = vars.get("AUTH_DEADLINE_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidAuthDeadline(format!(
                    "AUTH_DEADLINE_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 || value >= REQUEST_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidAuthDeadline(format!(
                    "AUTH_DEADLINE_SECONDS must be between 1 and {}, got {value}",
                    REQUEST_TIMEOUT_SECONDS - 1
                )));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_AUTH_DEADLINE_SECONDS)
        };

        let drain_period = if let Some(value_str) = vars.get("DRAIN_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainPeriod(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;
            Duration::from_secs(value)
        } else {
            Duration::ZERO
        };

        Ok(Config {
            bind_address,
            environment,
            issuer_base_url,
            jwks_path,
            max_retries,
            backoff_unit,
            http_timeout,
            auth_deadline,
            drain_period,
        })
    }
}
