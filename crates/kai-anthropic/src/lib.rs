// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter.
//!
//! Implements [`ProviderAdapter`] over the streaming Messages API. Claude has
//! no server-side thread or run: conversations get a synthetic id, tool
//! rounds resume by re-sending the grown history, and stopping a response
//! means dropping its stream.

pub mod client;
pub mod sse;
pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::StreamExt;
use kai_config::KaiConfig;
use kai_core::traits::{EventStream, PluginAdapter, ProviderAdapter};
use kai_core::types::{
    AdapterType, ContentBlock, ConversationTurn, HealthStatus, ProviderRequest, StreamEvent,
    ToolCallRequest, TurnContent,
};
use kai_core::KaiError;
use tracing::{debug, info, warn};

use crate::client::AnthropicClient;
use crate::sse::SseEvent;
use crate::types::{
    ApiContent, ApiContentBlock, ApiMessage, ImageSource, MessageRequest, ResponseContentBlock,
    SseDelta, SystemBlock,
};

/// Anthropic Claude provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config -> `ANTHROPIC_API_KEY` env var -> error.
pub struct AnthropicProvider {
    client: AnthropicClient,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(config: &KaiConfig) -> Result<Self, KaiError> {
        let api_key = resolve_api_key(&config.anthropic.api_key)?;
        let client = AnthropicClient::new(
            api_key,
            config.anthropic.api_version.clone(),
            config.anthropic.model.clone(),
        )?;

        info!(model = config.anthropic.model, "Anthropic provider initialized");

        Ok(Self::with_client(client, config.anthropic.max_tokens))
    }

    /// Creates a provider around an existing client.
    pub fn with_client(client: AnthropicClient, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    fn to_message_request(&self, request: &ProviderRequest) -> MessageRequest {
        MessageRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.client.default_model().to_string()),
            messages: request.messages.iter().map(convert_turn).collect(),
            system: request
                .system_prompt
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(SystemBlock::cached_text)
                .collect(),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            stream: true,
            tools: request
                .tools
                .iter()
                .map(|t| crate::types::ToolDefinition {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, KaiError> {
        // No token-consuming probe; a constructed client is considered healthy.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), KaiError> {
        debug!("Anthropic provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn open_conversation(&self) -> Result<String, KaiError> {
        Ok(format!("claude-{}", uuid::Uuid::new_v4().simple()))
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<EventStream, KaiError> {
        let api_request = self.to_message_request(request);
        let sse_stream = self.client.stream_message(&api_request).await?;

        let mut state = ToolUseState::default();
        let events = sse_stream.filter_map(move |result| {
            let event = match result {
                Ok(event) => state.map_event(event),
                Err(e) => Some(Err(e)),
            };
            async move { event }
        });

        Ok(Box::pin(events))
    }
}

/// Per-stream accumulation of tool_use blocks and the stop reason.
#[derive(Debug, Default)]
struct ToolUseState {
    /// Content block index -> (tool_use id, tool name, accumulated input JSON).
    blocks: HashMap<usize, (String, String, String)>,
    stop_reason: Option<String>,
}

impl ToolUseState {
    /// Maps one SSE event to at most one provider-neutral event.
    ///
    /// A tool call is emitted when its content block stops, with the
    /// accumulated input JSON parsed.
    fn map_event(&mut self, event: SseEvent) -> Option<Result<StreamEvent, KaiError>> {
        match event {
            SseEvent::ContentBlockStart(start) => {
                if let ResponseContentBlock::ToolUse { id, name, .. } = start.content_block {
                    self.blocks.insert(start.index, (id, name, String::new()));
                }
                None
            }
            SseEvent::ContentBlockDelta(delta) => match delta.delta {
                SseDelta::TextDelta { text } if !text.is_empty() => {
                    Some(Ok(StreamEvent::TextDelta(text)))
                }
                SseDelta::TextDelta { .. } => None,
                SseDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, _, json)) = self.blocks.get_mut(&delta.index) {
                        json.push_str(&partial_json);
                    }
                    None
                }
            },
            SseEvent::ContentBlockStop(stop) => {
                let (id, name, json) = self.blocks.remove(&stop.index)?;
                let input = if json.trim().is_empty() {
                    serde_json::Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&json).unwrap_or_else(|e| {
                        warn!(error = %e, json = %json, "failed to parse tool_use input JSON");
                        serde_json::json!({"_parse_error": e.to_string(), "_raw": json})
                    })
                };
                Some(Ok(StreamEvent::ToolCallRequested(ToolCallRequest {
                    id,
                    name,
                    input,
                })))
            }
            SseEvent::MessageStart(start) => {
                debug!(
                    id = %start.message.id,
                    model = %start.message.model,
                    input_tokens = start.message.usage.input_tokens,
                    cache_read_tokens = start.message.usage.cache_read_input_tokens,
                    "message started"
                );
                None
            }
            SseEvent::MessageDelta(delta) => {
                if delta.delta.stop_reason.is_some() {
                    self.stop_reason = delta.delta.stop_reason;
                }
                None
            }
            SseEvent::MessageStop => Some(Ok(StreamEvent::StreamEnded {
                stop_reason: self.stop_reason.take(),
            })),
            SseEvent::Error(err) => Some(Err(KaiError::provider(format!(
                "{}: {}",
                err.error.type_, err.error.message
            )))),
            SseEvent::Ping => None,
        }
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: &Option<String>) -> Result<String, KaiError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        KaiError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}

/// Converts a conversation turn to Anthropic's message shape.
fn convert_turn(turn: &ConversationTurn) -> ApiMessage {
    let content = match &turn.content {
        TurnContent::Text(text) => ApiContent::Text(text.clone()),
        TurnContent::Blocks(blocks) => convert_content_blocks(blocks),
    };
    ApiMessage {
        role: turn.role.to_string(),
        content,
    }
}

fn convert_content_blocks(blocks: &[ContentBlock]) -> ApiContent {
    if let [ContentBlock::Text { text }] = blocks {
        return ApiContent::Text(text.clone());
    }

    let api_blocks = blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => ApiContentBlock::Text { text: text.clone() },
            ContentBlock::Image { media_type, data } => ApiContentBlock::Image {
                source: ImageSource {
                    source_type: "base64".to_string(),
                    media_type: media_type.clone(),
                    data: data.clone(),
                },
            },
            // Claude has no file store; a file reference degrades to its name.
            ContentBlock::File { filename, .. } => ApiContentBlock::Text {
                text: format!("[file: {filename}]"),
            },
            ContentBlock::ToolUse { id, name, input } => ApiContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => ApiContentBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: content.clone(),
                is_error: is_error.then_some(true),
            },
        })
        .collect();

    ApiContent::Blocks(api_blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use kai_core::types::{Role, ToolCallResult, ToolDefinition, ToolTurn};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::types::{SseContentBlockDelta, SseContentBlockStart, SseContentBlockStop};

    fn test_provider(base_url: &str) -> AnthropicProvider {
        let client = AnthropicClient::new(
            "test-key".into(),
            "2023-06-01".into(),
            "claude-sonnet-4-20250514".into(),
        )
        .unwrap()
        .with_base_url(base_url.to_string());
        AnthropicProvider::with_client(client, 4096)
    }

    fn sse_body(events: &[(&str, serde_json::Value)]) -> String {
        events
            .iter()
            .map(|(name, data)| format!("event: {name}\ndata: {data}\n\n"))
            .collect()
    }

    fn tool_use_sse() -> String {
        sse_body(&[
            (
                "message_start",
                serde_json::json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude", "usage": {"input_tokens": 12}}}),
            ),
            (
                "content_block_start",
                serde_json::json!({"index": 0, "content_block": {"type": "text", "text": ""}}),
            ),
            (
                "content_block_delta",
                serde_json::json!({"index": 0, "delta": {"type": "text_delta", "text": "Creating it."}}),
            ),
            ("content_block_stop", serde_json::json!({"index": 0})),
            (
                "content_block_start",
                serde_json::json!({"index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "create_task", "input": {}}}),
            ),
            (
                "content_block_delta",
                serde_json::json!({"index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"title\":"}}),
            ),
            (
                "content_block_delta",
                serde_json::json!({"index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"Report\"}"}}),
            ),
            ("content_block_stop", serde_json::json!({"index": 1})),
            (
                "message_delta",
                serde_json::json!({"delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 20}}),
            ),
            ("ping", serde_json::json!({})),
            ("message_stop", serde_json::json!({})),
        ])
    }

    #[tokio::test]
    async fn stream_translates_text_and_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(tool_use_sse()),
            )
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let request = ProviderRequest {
            messages: vec![ConversationTurn::user("make a task")],
            ..Default::default()
        };
        let events: Vec<StreamEvent> = provider
            .stream(&request)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("Creating it.".into()),
                StreamEvent::ToolCallRequested(ToolCallRequest {
                    id: "toolu_1".into(),
                    name: "create_task".into(),
                    input: serde_json::json!({"title": "Report"}),
                }),
                StreamEvent::StreamEnded {
                    stop_reason: Some("tool_use".into())
                },
            ]
        );
    }

    #[tokio::test]
    async fn submit_tool_outputs_resends_grown_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "user", "content": "make a task"},
                    {"role": "assistant", "content": [{"type": "tool_use", "id": "toolu_1", "name": "create_task"}]},
                    {"role": "user", "content": [{"type": "tool_result", "tool_use_id": "toolu_1", "content": "{\"success\":true}"}]}
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&[("message_stop", serde_json::json!({}))])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let mut request = ProviderRequest {
            messages: vec![ConversationTurn::user("make a task")],
            ..Default::default()
        };
        let turn = ToolTurn {
            assistant_text: String::new(),
            calls: vec![ToolCallRequest {
                id: "toolu_1".into(),
                name: "create_task".into(),
                input: serde_json::json!({"title": "Report"}),
            }],
            results: vec![ToolCallResult {
                tool_call_id: "toolu_1".into(),
                output: r#"{"success":true}"#.into(),
            }],
        };
        let mut stream = provider
            .submit_tool_outputs(&mut request, None, turn)
            .await
            .unwrap();
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::StreamEnded { stop_reason: None }
        );
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn error_event_becomes_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&[(
                        "error",
                        serde_json::json!({"error": {"type": "overloaded_error", "message": "Overloaded"}}),
                    )])),
            )
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let mut stream = provider.stream(&ProviderRequest::default()).await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("overloaded_error"));
    }

    #[test]
    fn tool_use_with_empty_input_yields_empty_object() {
        let mut state = ToolUseState::default();
        state.map_event(SseEvent::ContentBlockStart(SseContentBlockStart {
            index: 2,
            content_block: ResponseContentBlock::ToolUse {
                id: "toolu_2".into(),
                name: "fetch_user_tasks".into(),
                input: serde_json::json!({}),
            },
        }));
        let event = state
            .map_event(SseEvent::ContentBlockStop(SseContentBlockStop { index: 2 }))
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            StreamEvent::ToolCallRequested(ToolCallRequest { ref input, .. }) if input == &serde_json::json!({})
        ));
    }

    #[test]
    fn text_block_stop_emits_nothing() {
        let mut state = ToolUseState::default();
        assert!(state
            .map_event(SseEvent::ContentBlockStop(SseContentBlockStop { index: 0 }))
            .is_none());
        assert!(state
            .map_event(SseEvent::ContentBlockDelta(SseContentBlockDelta {
                index: 0,
                delta: SseDelta::TextDelta { text: String::new() },
            }))
            .is_none());
    }

    #[test]
    fn request_conversion_uses_defaults_and_translates_tools() {
        let provider = test_provider("http://unused");
        let request = ProviderRequest {
            system_prompt: Some("You are Kai.".into()),
            messages: vec![ConversationTurn {
                role: Role::User,
                content: TurnContent::Blocks(vec![
                    ContentBlock::Text {
                        text: "What is this?".into(),
                    },
                    ContentBlock::Image {
                        media_type: "image/png".into(),
                        data: "aGVsbG8=".into(),
                    },
                ]),
            }],
            tools: vec![ToolDefinition {
                name: "create_task".into(),
                description: "Create a task".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ..Default::default()
        };

        let api = provider.to_message_request(&request);
        assert_eq!(api.model, "claude-sonnet-4-20250514");
        assert_eq!(api.max_tokens, 4096);
        assert_eq!(api.system[0].text, "You are Kai.");
        assert_eq!(api.tools[0].input_schema["type"], "object");
        match &api.messages[0].content {
            ApiContent::Blocks(blocks) => {
                assert!(matches!(&blocks[1], ApiContentBlock::Image { source } if source.source_type == "base64"));
            }
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[test]
    fn resolve_api_key_prefers_config() {
        assert_eq!(
            resolve_api_key(&Some("sk-test-123".into())).unwrap(),
            "sk-test-123"
        );
    }

    #[tokio::test]
    async fn conversations_get_distinct_synthetic_ids() {
        let provider = test_provider("http://unused");
        let a = provider.open_conversation().await.unwrap();
        let b = provider.open_conversation().await.unwrap();
        assert!(a.starts_with("claude-"));
        assert_ne!(a, b);
        assert_eq!(provider.adapter_type(), AdapterType::Provider);
    }
}
