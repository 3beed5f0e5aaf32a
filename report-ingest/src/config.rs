use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Backend timeout cannot be 0")]
    InvalidTimeout,

    #[error("Maximum body size cannot be 0")]
    InvalidMaxBodySize,

    #[error("Empty tenant API key")]
    EmptyApiKey,

    #[error("Empty secret for tenant API key: {0}")]
    EmptySecret(String),
}

/// Report ingest configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener receiving browser reports
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    /// Analytics backend the beacons are forwarded to
    pub backend: BackendConfig,
    /// Attach the raw report (and script location, where available) to every
    /// encoded error
    #[serde(default)]
    pub include_full_report: bool,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Maps tenant API keys to their backend secrets
    ///
    /// Loaded once at startup; there is no reload path.
    pub tenants: HashMap<String, String>,
}

fn default_max_body_size() -> usize {
    64 * 1024
}

impl Config {
    /// Validates the report ingest configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.backend.validate()?;

        if self.max_body_size == 0 {
            return Err(ValidationError::InvalidMaxBodySize);
        }

        for (api_key, secret) in &self.tenants {
            if api_key.is_empty() {
                return Err(ValidationError::EmptyApiKey);
            }
            if secret.is_empty() {
                return Err(ValidationError::EmptySecret(api_key.clone()));
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Analytics backend configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Collector URL beacons are posted to
    ///
    /// Note: Uses the `url::Url` type so invalid URLs are rejected during
    /// config deserialization.
    pub url: Url,
    /// Upper bound for a single beacon delivery
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}
