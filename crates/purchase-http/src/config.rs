//! HTTP gateway configuration

use purchase_core::ConfigError;
use purchase_core::config::env_or;
use thiserror::Error;

/// HTTP gateway configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpGatewayConfig {
    /// Backend base URL, without the `/billing/v1` prefix
    pub base_url: String,

    /// Public API key sent as a bearer token
    pub api_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl HttpGatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Load from `PURCHASE_API_URL`, `PURCHASE_API_KEY` and `PURCHASE_API_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let api_key = std::env::var("PURCHASE_API_KEY")
            .map_err(|_| ConfigError::Missing("PURCHASE_API_KEY"))?;

        Ok(Self {
            base_url: env_or("PURCHASE_API_URL", defaults.base_url)?,
            api_key,
            timeout_secs: env_or("PURCHASE_API_TIMEOUT_SECS", defaults.timeout_secs)?,
        })
    }
}

/// Errors building the HTTP gateway
#[derive(Error, Debug)]
pub enum HttpGatewayError {
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
