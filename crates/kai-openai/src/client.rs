// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI Assistants API.

use std::time::Duration;

use kai_core::KaiError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::debug;

use crate::sse::{self, SseStream};
use crate::types::{
    ApiErrorResponse, CreateRunRequest, CreateThreadAndRunRequest, ObjectRef,
    SubmitToolOutputsRequest, ThreadMessage,
};

const API_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP client for Assistants threads, runs and files.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> Result<Self, KaiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| KaiError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));

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
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// `POST /threads` with no initial messages.
    pub async fn create_thread(&self) -> Result<String, KaiError> {
        let thread: ObjectRef = self.post_json("/threads", &serde_json::json!({})).await?;
        Ok(thread.id)
    }

    /// Appends a message to an existing thread.
    pub async fn add_message(
        &self,
        thread_id: &str,
        message: &ThreadMessage,
    ) -> Result<String, KaiError> {
        let created: ObjectRef = self
            .post_json(&format!("/threads/{thread_id}/messages"), message)
            .await?;
        Ok(created.id)
    }

    /// Starts a streaming run on an existing thread.
    pub async fn stream_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<SseStream, KaiError> {
        self.post_stream(&format!("/threads/{thread_id}/runs"), request)
            .await
    }

    /// Creates a throwaway thread and streams a run on it.
    pub async fn stream_thread_and_run(
        &self,
        request: &CreateThreadAndRunRequest,
    ) -> Result<SseStream, KaiError> {
        self.post_stream("/threads/runs", request).await
    }

    /// Resumes a run paused on `requires_action`.
    pub async fn stream_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
    ) -> Result<SseStream, KaiError> {
        self.post_stream(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            request,
        )
        .await
    }

    pub async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), KaiError> {
        let _: ObjectRef = self
            .post_json(
                &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }

    /// Multipart upload to `/files`. Returns the file id.
    pub async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        purpose: &str,
    ) -> Result<String, KaiError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| KaiError::Provider {
                message: format!("invalid MIME type {mime_type}: {e}"),
                source: Some(Box::new(e)),
            })?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.to_string())
            .part("file", part);

        let response = self
            .client
            .post(self.url("/files"))
            .multipart(form)
            .send()
            .await
            .map_err(request_failed)?;
        let file: ObjectRef = check(response)
            .await?
            .json()
            .await
            .map_err(request_failed)?;
        debug!(file_id = %file.id, filename, purpose, "file uploaded");
        Ok(file.id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<B: Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, KaiError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(request_failed)?;
        check(response).await?.json().await.map_err(request_failed)
    }

    async fn post_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<SseStream, KaiError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(request_failed)?;
        debug!(path, status = %response.status(), "streaming response received");
        Ok(sse::parse_sse_stream(check(response).await?))
    }
}

fn request_failed(e: reqwest::Error) -> KaiError {
    KaiError::Provider {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Passes 2xx responses through and turns the rest into provider errors.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, KaiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_err) => format!("OpenAI API error ({status}): {}", api_err.error.message),
        Err(_) => format!("API returned {status}: {body}"),
    };
    Err(KaiError::provider(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new("sk-test").unwrap().with_base_url(base_url.to_string())
    }

    #[tokio::test]
    async fn create_thread_sends_auth_and_beta_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("openai-beta", "assistants=v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "thread_abc", "object": "thread"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = test_client(&server.uri()).create_thread().await.unwrap();
        assert_eq!(id, "thread_abc");
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"message": "No assistant found", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri()).create_thread().await.unwrap_err();
        assert!(err.to_string().contains("No assistant found"), "got: {err}");
    }

    #[tokio::test]
    async fn upload_file_posts_multipart_with_purpose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .and(body_string_contains("assistants"))
            .and(body_string_contains("report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "file_123", "object": "file"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = test_client(&server.uri())
            .upload_file("report.pdf", "application/pdf", b"%PDF-1.4".to_vec(), "assistants")
            .await
            .unwrap();
        assert_eq!(id, "file_123");
    }

    #[tokio::test]
    async fn cancel_run_posts_to_run_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs/run_1/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "run_1", "status": "cancelling"
            })))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server.uri())
            .cancel_run("thread_1", "run_1")
            .await
            .unwrap();
    }
}
