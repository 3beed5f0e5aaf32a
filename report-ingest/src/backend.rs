//! Delivery of beacons to the analytics backend.
//!
//! A [`Backend`] opens one [`Session`] per tenant. Sessions carry the
//! tenant's credentials and are shared by every request for that tenant.

use crate::beacon::Beacon;
use crate::config::BackendConfig;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("secret for API key {0:?} is not a valid header value")]
    InvalidSecret(String),
    #[error("backend request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("backend responded with status {0}")]
    UnexpectedStatus(u16),
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn send(&self, beacon: &Beacon) -> Result<(), BackendError>;
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn open_session(
        &self,
        api_key: &str,
        secret: &str,
    ) -> Result<Arc<dyn Session>, BackendError>;
}

/// Posts beacons as form data to the configured collector URL.
pub struct HttpBackend {
    url: Url,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        HttpBackend {
            url: config.url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn open_session(
        &self,
        api_key: &str,
        secret: &str,
    ) -> Result<Arc<dyn Session>, BackendError> {
        let mut authorization = HeaderValue::from_str(&format!("Bearer {secret}"))
            .map_err(|_| BackendError::InvalidSecret(api_key.to_string()))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?;

        Ok(Arc::new(HttpSession {
            client,
            url: self.url.clone(),
            api_key: api_key.to_string(),
        }))
    }
}

struct HttpSession {
    client: reqwest::Client,
    url: Url,
    api_key: String,
}

#[async_trait]
impl Session for HttpSession {
    async fn send(&self, beacon: &Beacon) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url.clone())
            .query(&[("api_key", self.api_key.as_str())])
            .form(beacon)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }
}
