//! HTTP transport seam
//!
//! `Transport` is the only thing the client needs from the network: a GET
//! and a PATCH resolving to parsed JSON. Cancellation is cooperative: the
//! client wraps the returned future and dropping it drops the request.

use crate::config::ApiConfig;
use crate::error::{FetchError, Result};
use async_trait::async_trait;
use city_prefs_types::ApiErrorBody;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and parse the body as JSON
    async fn get(&self, url: Url) -> Result<Value>;

    /// PATCH `url` with a JSON body. `None` for an empty (e.g. 204) reply.
    async fn patch(&self, url: Url, body: Value) -> Result<Option<Value>>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: Url) -> Result<Value> {
        tracing::debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(status_error(status, &bytes));
        }
        if bytes.is_empty() {
            return Err(FetchError::Decode("empty response body".to_string()));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn patch(&self, url: Url, body: Value) -> Result<Option<Value>> {
        tracing::debug!(%url, "PATCH");
        let response = self.client.patch(url).json(&body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(status_error(status, &bytes));
        }
        if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// Non-2xx reply: prefer the server's own error message when it sent one.
fn status_error(status: StatusCode, body: &[u8]) -> FetchError {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| ApiErrorBody::from_value(&v))
        .map(|e| FetchError::Api(e.message))
        .unwrap_or_else(|| FetchError::Transport(format!("HTTP {}", status)))
}

// =============================================================================
// TEST DOUBLE
// =============================================================================
