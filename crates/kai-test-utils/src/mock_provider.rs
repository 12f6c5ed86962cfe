// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted LLM provider for deterministic testing.
//!
//! `MockProvider` plays back a queue of rounds. Each call to `stream` or
//! `submit_tool_outputs` consumes one round; when the queue is empty a
//! plain "mock response" round is played. Every request, tool turn,
//! cancellation and upload is recorded for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use kai_core::types::{
    AdapterType, HealthStatus, ProviderRequest, RunHandle, StreamEvent, ToolCallRequest, ToolTurn,
};
use kai_core::{EventStream, KaiError, PluginAdapter, ProviderAdapter};

/// One scripted model round.
#[derive(Debug, Clone)]
pub enum ScriptedRound {
    /// Text only; the model is done.
    Text(String),
    /// Optional text followed by tool calls.
    Tools {
        text: String,
        calls: Vec<ToolCallRequest>,
    },
    /// The stream fails with a provider error.
    Error(String),
    /// Starts run `run_id`, emits `text`, then never ends.
    Stalled { run_id: String, text: String },
}

/// An uploaded file as recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
}

/// A provider that replays scripted rounds.
pub struct MockProvider {
    rounds: Mutex<VecDeque<ScriptedRound>>,
    requests: Mutex<Vec<ProviderRequest>>,
    tool_turns: Mutex<Vec<ToolTurn>>,
    cancelled: Mutex<Vec<String>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    conversations: AtomicUsize,
    runs: AtomicUsize,
    file_store: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            rounds: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            tool_turns: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            conversations: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            file_store: false,
        }
    }

    /// Queues a text-only round.
    pub fn with_text_round(self, text: impl Into<String>) -> Self {
        self.push(ScriptedRound::Text(text.into()))
    }

    /// Queues a round that requests tools.
    pub fn with_tool_round(self, text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        self.push(ScriptedRound::Tools {
            text: text.into(),
            calls,
        })
    }

    /// Queues a round whose stream fails.
    pub fn with_error_round(self, message: impl Into<String>) -> Self {
        self.push(ScriptedRound::Error(message.into()))
    }

    /// Queues a round that never finishes on its own.
    pub fn with_stalled_round(self, run_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(ScriptedRound::Stalled {
            run_id: run_id.into(),
            text: text.into(),
        })
    }

    /// Makes `upload_file` succeed with `file-N` ids.
    pub fn with_file_store(mut self) -> Self {
        self.file_store = true;
        self
    }

    fn push(self, round: ScriptedRound) -> Self {
        self.enqueue(round);
        self
    }

    /// Appends a round to the queue of a shared provider.
    pub fn enqueue(&self, round: ScriptedRound) {
        self.lock(&self.rounds).push_back(round);
    }

    /// Every request passed to `stream`, in order, including resubmissions.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.lock(&self.requests).clone()
    }

    /// Tool turns passed to `submit_tool_outputs`.
    pub fn tool_turns(&self) -> Vec<ToolTurn> {
        self.lock(&self.tool_turns).clone()
    }

    /// Run ids passed to `cancel_run`.
    pub fn cancelled_runs(&self) -> Vec<String> {
        self.lock(&self.cancelled).clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.lock(&self.uploads).clone()
    }

    /// Number of `open_conversation` calls.
    pub fn conversations_opened(&self) -> usize {
        self.conversations.load(Ordering::SeqCst)
    }

    fn lock<'a, T>(&self, m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_round(&self) -> ScriptedRound {
        self.lock(&self.rounds)
            .pop_front()
            .unwrap_or_else(|| ScriptedRound::Text("mock response".to_string()))
    }

    fn play(&self, request: &ProviderRequest, round: ScriptedRound) -> EventStream {
        let run = RunHandle {
            thread_id: request.conversation_id.clone(),
            run_id: format!("mock-run-{}", self.runs.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let ended = |reason: &str| {
            Ok(StreamEvent::StreamEnded {
                stop_reason: Some(reason.to_string()),
            })
        };

        match round {
            ScriptedRound::Text(text) => Box::pin(stream::iter(vec![
                Ok(StreamEvent::RunStarted(run)),
                Ok(StreamEvent::TextDelta(text)),
                ended("end_turn"),
            ])),
            ScriptedRound::Tools { text, calls } => {
                let mut events = vec![Ok(StreamEvent::RunStarted(run))];
                if !text.is_empty() {
                    events.push(Ok(StreamEvent::TextDelta(text)));
                }
                events.extend(calls.into_iter().map(|c| Ok(StreamEvent::ToolCallRequested(c))));
                events.push(ended("tool_use"));
                Box::pin(stream::iter(events))
            }
            ScriptedRound::Error(message) => Box::pin(stream::iter(vec![
                Ok(StreamEvent::RunStarted(run)),
                Err(KaiError::provider(message)),
            ])),
            ScriptedRound::Stalled { run_id, text } => Box::pin(
                stream::iter(vec![
                    Ok(StreamEvent::RunStarted(RunHandle {
                        thread_id: request.conversation_id.clone(),
                        run_id,
                    })),
                    Ok(StreamEvent::TextDelta(text)),
                ])
                .chain(stream::pending()),
            ),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, KaiError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), KaiError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn open_conversation(&self) -> Result<String, KaiError> {
        let n = self.conversations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("mock-thread-{n}"))
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<EventStream, KaiError> {
        self.lock(&self.requests).push(request.clone());
        let round = self.next_round();
        Ok(self.play(request, round))
    }

    async fn submit_tool_outputs(
        &self,
        request: &mut ProviderRequest,
        _run: Option<&RunHandle>,
        turn: ToolTurn,
    ) -> Result<EventStream, KaiError> {
        self.lock(&self.tool_turns).push(turn.clone());
        request.messages.extend(turn.into_turns());
        self.stream(request).await
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<(), KaiError> {
        self.lock(&self.cancelled).push(run.run_id.clone());
        Ok(())
    }

    async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Option<String>, KaiError> {
        let mut uploads = self.lock(&self.uploads);
        uploads.push(RecordedUpload {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len(),
        });
        Ok(self.file_store.then(|| format!("file-{}", uploads.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn collect(stream: EventStream) -> Vec<StreamEvent> {
        stream.map(|e| e.unwrap()).collect().await
    }

    #[tokio::test]
    async fn plays_rounds_in_order_then_default() {
        let provider = MockProvider::new()
            .with_tool_round(
                "",
                vec![ToolCallRequest {
                    id: "c1".into(),
                    name: "get_tasks".into(),
                    input: json!({}),
                }],
            )
            .with_text_round("done");

        let first = collect(provider.stream(&ProviderRequest::default()).await.unwrap()).await;
        assert!(matches!(first[1], StreamEvent::ToolCallRequested(_)));

        let second = collect(provider.stream(&ProviderRequest::default()).await.unwrap()).await;
        assert_eq!(second[1], StreamEvent::TextDelta("done".into()));

        let third = collect(provider.stream(&ProviderRequest::default()).await.unwrap()).await;
        assert_eq!(third[1], StreamEvent::TextDelta("mock response".into()));
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn submit_records_turn_and_extends_history() {
        let provider = MockProvider::new().with_text_round("ok");
        let mut request = ProviderRequest::default();
        let turn = ToolTurn {
            assistant_text: String::new(),
            calls: vec![],
            results: vec![],
        };
        provider.submit_tool_outputs(&mut request, None, turn).await.unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(provider.tool_turns().len(), 1);
        assert_eq!(provider.requests()[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn uploads_need_a_file_store() {
        let without = MockProvider::new();
        assert_eq!(without.upload_file("a.pdf", "application/pdf", vec![1]).await.unwrap(), None);
        let with = MockProvider::new().with_file_store();
        assert_eq!(
            with.upload_file("a.pdf", "application/pdf", vec![1, 2]).await.unwrap(),
            Some("file-1".to_string())
        );
        assert_eq!(with.uploads()[0].size, 2);
    }
}
