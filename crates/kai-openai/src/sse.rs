// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for Assistants run streams.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use kai_core::KaiError;
use serde::de::DeserializeOwned;

use crate::types::{ApiErrorDetail, ApiErrorResponse, MessageDelta, Run};

/// The run-stream events the provider acts on.
#[derive(Debug, Clone)]
pub enum SseEvent {
    RunCreated(Run),
    MessageDelta(MessageDelta),
    RequiresAction(Run),
    /// `completed`, `cancelled`, `expired` or `incomplete`.
    RunEnded(Run),
    RunFailed(Run),
    Error(ApiErrorDetail),
    Done,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, KaiError>> + Send>>;

fn decode<T: DeserializeOwned>(name: &str, data: &str) -> Result<T, KaiError> {
    serde_json::from_str(data).map_err(|e| KaiError::Provider {
        message: format!("failed to parse {name}: {e}"),
        source: Some(Box::new(e)),
    })
}

/// The error event carries a bare error object; tolerate the wrapped shape too.
fn decode_error(data: &str) -> Result<ApiErrorDetail, KaiError> {
    match serde_json::from_str::<ApiErrorResponse>(data) {
        Ok(wrapped) => Ok(wrapped.error),
        Err(_) => decode("error", data),
    }
}

/// Parses a streaming run response into [`SseEvent`]s.
///
/// Step, queue and lifecycle events the provider does not need are skipped.
pub fn parse_sse_stream(response: reqwest::Response) -> SseStream {
    let mapped = response
        .bytes_stream()
        .eventsource()
        .filter_map(|result| async move {
            match result {
                Ok(event) => {
                    let data = event.data.as_str();
                    let name = event.event.as_str();
                    let parsed = match name {
                        "thread.run.created" => decode(name, data).map(SseEvent::RunCreated),
                        "thread.message.delta" => decode(name, data).map(SseEvent::MessageDelta),
                        "thread.run.requires_action" => {
                            decode(name, data).map(SseEvent::RequiresAction)
                        }
                        "thread.run.completed"
                        | "thread.run.cancelled"
                        | "thread.run.expired"
                        | "thread.run.incomplete" => decode(name, data).map(SseEvent::RunEnded),
                        "thread.run.failed" => decode(name, data).map(SseEvent::RunFailed),
                        "error" => decode_error(data).map(SseEvent::Error),
                        "done" => Ok(SseEvent::Done),
                        _ => return None,
                    };
                    Some(parsed)
                }
                Err(e) => Some(Err(KaiError::provider(format!("SSE stream error: {e}")))),
            }
        });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;

        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn lifecycle_events_are_skipped() {
        let sse = concat!(
            "event: thread.created\ndata: {\"id\":\"thread_1\"}\n\n",
            "event: thread.run.queued\ndata: {\"id\":\"run_1\",\"thread_id\":\"thread_1\",\"status\":\"queued\"}\n\n",
            "event: thread.run.created\ndata: {\"id\":\"run_1\",\"thread_id\":\"thread_1\",\"status\":\"queued\"}\n\n",
            "event: done\ndata: [DONE]\n\n",
        );
        let events: Vec<_> = parse_sse_stream(mock_sse_response(sse).await)
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SseEvent::RunCreated(run) if run.id == "run_1"));
        assert!(matches!(events[1], SseEvent::Done));
    }

    #[tokio::test]
    async fn terminal_statuses_map_to_run_ended() {
        let sse = "event: thread.run.cancelled\ndata: {\"id\":\"run_1\",\"thread_id\":\"t\",\"status\":\"cancelled\"}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);
        match stream.next().await.unwrap().unwrap() {
            SseEvent::RunEnded(run) => assert_eq!(run.status, "cancelled"),
            other => panic!("expected RunEnded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_event_accepts_bare_object() {
        let sse = "event: error\ndata: {\"message\":\"server_error\",\"type\":\"server_error\"}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);
        match stream.next().await.unwrap().unwrap() {
            SseEvent::Error(err) => assert_eq!(err.message, "server_error"),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
