// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI Assistants provider adapter.
//!
//! Threads live server-side: a persistent conversation posts only the newest
//! user turn before starting a run, while an ephemeral request seeds a
//! throwaway thread with its whole message window. Tool rounds resume the
//! paused run with `submit_tool_outputs`, and a run can be cancelled.

pub mod client;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use base64::Engine;
use futures::stream::{self, StreamExt};
use kai_config::KaiConfig;
use kai_core::traits::{EventStream, PluginAdapter, ProviderAdapter};
use kai_core::types::{
    AdapterType, ContentBlock, ConversationTurn, HealthStatus, ProviderRequest, Role, RunHandle,
    StreamEvent, ToolCallRequest, ToolTurn, TurnContent,
};
use kai_core::KaiError;
use tracing::{debug, info, warn};

use crate::client::OpenAiClient;
use crate::sse::{SseEvent, SseStream};
use crate::types::{
    AssistantTool, ContentPart, CreateRunRequest, CreateThreadAndRunRequest, FunctionSpec,
    ImageFileRef, MessageAttachment, MessageContent, SubmitToolOutputsRequest, ThreadMessage,
    ThreadSeed, ToolOutput,
};

/// OpenAI Assistants provider implementing [`ProviderAdapter`].
pub struct OpenAiProvider {
    client: OpenAiClient,
    assistant_id: String,
    model: Option<String>,
}

impl OpenAiProvider {
    /// API key resolution order: config -> `OPENAI_API_KEY` env var -> error.
    pub fn new(config: &KaiConfig) -> Result<Self, KaiError> {
        let api_key = resolve_api_key(&config.openai.api_key)?;
        let assistant_id = config
            .openai
            .assistant_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| KaiError::Config("openai.assistant_id is required".into()))?;
        let client = OpenAiClient::new(&api_key)?;

        info!(assistant_id = %assistant_id, "OpenAI Assistants provider initialized");

        Ok(Self::with_client(
            client,
            assistant_id,
            config.openai.model.clone(),
        ))
    }

    pub fn with_client(client: OpenAiClient, assistant_id: String, model: Option<String>) -> Self {
        Self {
            client,
            assistant_id,
            model,
        }
    }

    fn run_request(&self, request: &ProviderRequest, documents: bool) -> CreateRunRequest {
        let mut tools: Vec<AssistantTool> = request
            .tools
            .iter()
            .map(|t| AssistantTool::Function {
                function: FunctionSpec {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect();
        if documents {
            tools.push(AssistantTool::FileSearch);
        }

        CreateRunRequest {
            assistant_id: self.assistant_id.clone(),
            model: request.model.clone().or_else(|| self.model.clone()),
            instructions: request
                .system_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
            tools,
            stream: true,
        }
    }

    /// Converts a turn to a thread message, uploading inline images.
    async fn to_thread_message(&self, turn: &ConversationTurn) -> ThreadMessage {
        let role = turn.role.to_string();
        let blocks = match &turn.content {
            TurnContent::Text(text) => {
                return ThreadMessage {
                    role,
                    content: MessageContent::Text(text.clone()),
                    attachments: Vec::new(),
                };
            }
            TurnContent::Blocks(blocks) => blocks,
        };

        let mut parts = Vec::new();
        let mut attachments = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text } => parts.push(ContentPart::Text { text: text.clone() }),
                // Image parts are only accepted on user messages.
                ContentBlock::Image { media_type, data } if turn.role == Role::User => {
                    match self.upload_image(media_type, data).await {
                        Ok(file_id) => parts.push(ContentPart::ImageFile {
                            image_file: ImageFileRef { file_id },
                        }),
                        Err(e) => {
                            warn!(error = %e, "image upload failed, sending placeholder");
                            parts.push(ContentPart::Text {
                                text: "[image could not be processed]".to_string(),
                            });
                        }
                    }
                }
                ContentBlock::File { file_id, .. } => attachments.push(MessageAttachment {
                    file_id: file_id.clone(),
                    tools: vec![AssistantTool::FileSearch],
                }),
                other => {
                    let text = ConversationTurn {
                        role: turn.role,
                        content: TurnContent::Blocks(vec![other.clone()]),
                    }
                    .text();
                    if !text.is_empty() {
                        parts.push(ContentPart::Text { text });
                    }
                }
            }
        }

        // A message needs at least one content part.
        if parts.is_empty() {
            parts.push(ContentPart::Text {
                text: "(attachment)".to_string(),
            });
        }

        ThreadMessage {
            role,
            content: MessageContent::Parts(parts),
            attachments,
        }
    }

    async fn upload_image(&self, media_type: &str, data: &str) -> Result<String, KaiError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| KaiError::Provider {
                message: format!("invalid base64 image: {e}"),
                source: Some(Box::new(e)),
            })?;
        let extension = media_type.rsplit('/').next().unwrap_or("png");
        self.client
            .upload_file(&format!("image.{extension}"), media_type, bytes, "vision")
            .await
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
        debug!("OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn open_conversation(&self) -> Result<String, KaiError> {
        self.client.create_thread().await
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<EventStream, KaiError> {
        let sse = match &request.conversation_id {
            Some(thread_id) => {
                let newest = request
                    .messages
                    .iter()
                    .rev()
                    .find(|t| t.role == Role::User)
                    .ok_or_else(|| KaiError::provider("no user turn to post to the thread"))?;
                let message = self.to_thread_message(newest).await;
                let documents = message.has_documents();
                self.client.add_message(thread_id, &message).await?;
                debug!(thread_id = %thread_id, "user turn posted, starting run");
                self.client
                    .stream_run(thread_id, &self.run_request(request, documents))
                    .await?
            }
            None => {
                let mut messages = Vec::with_capacity(request.messages.len());
                for turn in &request.messages {
                    messages.push(self.to_thread_message(turn).await);
                }
                let documents = messages.iter().any(ThreadMessage::has_documents);
                let run = self.run_request(request, documents);
                self.client
                    .stream_thread_and_run(&CreateThreadAndRunRequest {
                        run,
                        thread: ThreadSeed { messages },
                    })
                    .await?
            }
        };
        Ok(translate(sse))
    }

    async fn submit_tool_outputs(
        &self,
        _request: &mut ProviderRequest,
        run: Option<&RunHandle>,
        turn: ToolTurn,
    ) -> Result<EventStream, KaiError> {
        let (thread_id, run_id) = match run {
            Some(RunHandle {
                thread_id: Some(thread_id),
                run_id,
            }) => (thread_id, run_id),
            _ => {
                return Err(KaiError::provider(
                    "tool outputs submitted without an active run",
                ));
            }
        };

        let request = SubmitToolOutputsRequest {
            tool_outputs: turn
                .results
                .into_iter()
                .map(|r| ToolOutput {
                    tool_call_id: r.tool_call_id,
                    output: r.output,
                })
                .collect(),
            stream: true,
        };
        debug!(thread_id = %thread_id, run_id = %run_id, outputs = request.tool_outputs.len(), "submitting tool outputs");
        let sse = self
            .client
            .stream_tool_outputs(thread_id, run_id, &request)
            .await?;
        Ok(translate(sse))
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<(), KaiError> {
        let Some(thread_id) = &run.thread_id else {
            return Ok(());
        };
        self.client.cancel_run(thread_id, &run.run_id).await
    }

    async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Option<String>, KaiError> {
        self.client
            .upload_file(filename, mime_type, bytes, "assistants")
            .await
            .map(Some)
    }
}

fn translate(sse: SseStream) -> EventStream {
    Box::pin(sse.flat_map(|result| {
        let events = match result {
            Ok(event) => map_event(event),
            Err(e) => vec![Err(e)],
        };
        stream::iter(events)
    }))
}

/// Maps one run-stream event to provider-neutral events.
fn map_event(event: SseEvent) -> Vec<Result<StreamEvent, KaiError>> {
    match event {
        SseEvent::RunCreated(run) => vec![Ok(StreamEvent::RunStarted(RunHandle {
            thread_id: Some(run.thread_id),
            run_id: run.id,
        }))],
        SseEvent::MessageDelta(delta) => {
            let text = delta.text();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Ok(StreamEvent::TextDelta(text))]
            }
        }
        SseEvent::RequiresAction(run) => {
            let calls = run
                .required_action
                .map(|a| a.submit_tool_outputs.tool_calls)
                .unwrap_or_default();
            let mut events: Vec<_> = calls
                .into_iter()
                .map(|call| {
                    Ok(StreamEvent::ToolCallRequested(ToolCallRequest {
                        id: call.id,
                        name: call.function.name,
                        input: parse_arguments(&call.function.arguments),
                    }))
                })
                .collect();
            events.push(Ok(StreamEvent::StreamEnded {
                stop_reason: Some(run.status),
            }));
            events
        }
        SseEvent::RunEnded(run) => vec![Ok(StreamEvent::StreamEnded {
            stop_reason: Some(run.status),
        })],
        SseEvent::RunFailed(run) => {
            let detail = run
                .last_error
                .map(|e| match e.code {
                    Some(code) => format!("{code}: {}", e.message),
                    None => e.message,
                })
                .unwrap_or_else(|| "no error detail".to_string());
            vec![Err(KaiError::provider(format!("run {} failed: {detail}", run.id)))]
        }
        SseEvent::Error(err) => vec![Err(KaiError::provider(err.message))],
        SseEvent::Done => Vec::new(),
    }
}

fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(arguments).unwrap_or_else(|e| {
        warn!(error = %e, arguments, "failed to parse tool call arguments");
        serde_json::json!({"_parse_error": e.to_string(), "_raw": arguments})
    })
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, KaiError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("OPENAI_API_KEY").map_err(|_| {
        KaiError::Config(
            "OpenAI API key not found. Set openai.api_key in config or OPENAI_API_KEY environment variable.".into(),
        )
    })
}
