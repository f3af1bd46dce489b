//! Collector upload transport
//!
//! One POST per cycle with a bounded wait. The uploader reports the HTTP
//! status and nothing else; retry policy (there is none beyond the next
//! cycle) belongs to the scheduler.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{AgentError, Result};

/// Upload seam consumed by the cycle runner; mocked in tests
#[async_trait]
pub trait Uploader: Send + Sync {
    /// POST the payload to the collector, returning the HTTP status code
    async fn upload(&self, payload: &Value) -> Result<u16>;
}

/// HTTP uploader posting JSON to the configured collector endpoint
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::upload(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, payload: &Value) -> Result<u16> {
        debug!("Uploading telemetry to {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AgentError::upload(format!("POST {} failed: {e}", self.url)))?;
        Ok(response.status().as_u16())
    }
}
