// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API request types and SSE event payloads.

use serde::{Deserialize, Serialize};

// --- Cache control types ---

/// Marker for Anthropic prompt caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheControlMarker {
    #[serde(rename = "type")]
    pub control_type: String,
}

impl CacheControlMarker {
    pub fn ephemeral() -> Self {
        Self {
            control_type: "ephemeral".to_string(),
        }
    }
}

/// A structured system prompt block. The system prompt is sent as a single
/// cached block since it repeats across every round of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControlMarker>,
}

impl SystemBlock {
    pub fn cached_text(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: text.into(),
            cache_control: Some(CacheControlMarker::ephemeral()),
        }
    }
}

// --- Tool types ---

/// A tool definition in Anthropic's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub input_schema: serde_json::Value,
}

// --- Request types ---

/// A request to the Anthropic Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A single message in the Anthropic conversation format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: ApiContent,
}

/// Message content: a plain string or typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

/// A typed content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ImageSource },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Source data for an image content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Always "base64" for inline images.
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

// --- Response types ---

/// The message object carried by `message_start`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: ApiUsage,
}

/// A content block announced by `content_block_start`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    /// The model is requesting a tool invocation. Its input arrives as
    /// `input_json_delta` fragments.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

// --- SSE event types ---

#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageStart {
    pub message: MessageResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockStart {
    pub index: usize,
    pub content_block: ResponseContentBlock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockDelta {
    pub index: usize,
    pub delta: SseDelta,
}

/// A delta update within a content block.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SseDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    /// Partial JSON of a tool_use input.
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockStop {
    pub index: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageDelta {
    pub delta: SseMessageDeltaInfo,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageDeltaInfo {
    pub stop_reason: Option<String>,
}

/// SSE `error` event, and the body of non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}
