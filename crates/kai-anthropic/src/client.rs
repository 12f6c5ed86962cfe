// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Handles authentication headers, streaming SSE responses, and a single
//! retry on transient errors.

use std::time::Duration;

use kai_core::KaiError;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::sse::{self, SseStream};
use crate::types::{ApiErrorResponse, MessageRequest};

/// Base URL for the Anthropic Messages API.
const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// HTTP client for Anthropic API communication.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    default_model: String,
    max_retries: u32,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, api_version: String, model: String) -> Result<Self, KaiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|e| KaiError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&api_version)
                .map_err(|e| KaiError::Config(format!("invalid API version header value: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| KaiError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            default_model: model,
            max_retries: 1,
            base_url: API_BASE_URL.to_string(),
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Sends a streaming request and returns the raw SSE event stream.
    ///
    /// On transient errors (429, 500, 503, 529), retries once after a
    /// 1-second delay.
    pub async fn stream_message(&self, request: &MessageRequest) -> Result<SseStream, KaiError> {
        let mut req = request.clone();
        req.stream = true;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying streaming request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&self.base_url)
                .json(&req)
                .send()
                .await
                .map_err(|e| KaiError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "streaming response received");

            if status.is_success() {
                return Ok(sse::parse_sse_stream(response));
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "Anthropic API error ({}): {}",
                    api_err.error.type_, api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };
            return Err(KaiError::provider(message));
        }

        Err(KaiError::provider("streaming request failed after retries"))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}
