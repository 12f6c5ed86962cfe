// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI Assistants API (v2) request and response types.

use serde::{Deserialize, Serialize};

// --- Tool types ---

/// A tool enabled for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantTool {
    Function { function: FunctionSpec },
    /// Lets the assistant read attached documents.
    FileSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

// --- Message types ---

/// A message posted to a thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<MessageAttachment>,
}

impl ThreadMessage {
    /// True when a document is attached and the run needs `file_search`.
    pub fn has_documents(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageFile { image_file: ImageFileRef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFileRef {
    pub file_id: String,
}

/// A file attached to a message, searchable by the listed tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageAttachment {
    pub file_id: String,
    pub tools: Vec<AssistantTool>,
}

// --- Request types ---

/// `POST /threads/{thread_id}/runs`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AssistantTool>,
    pub stream: bool,
}

/// `POST /threads/runs`: creates a throwaway thread and runs it in one call.
#[derive(Debug, Clone, Serialize)]
pub struct CreateThreadAndRunRequest {
    #[serde(flatten)]
    pub run: CreateRunRequest,
    pub thread: ThreadSeed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSeed {
    pub messages: Vec<ThreadMessage>,
}

/// `POST /threads/{thread_id}/runs/{run_id}/submit_tool_outputs`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

// --- Response types ---

/// Any object whose only interesting field is its id (threads, messages, files).
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

/// A run object, carried by every `thread.run.*` stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: String,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<RequiredToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Payload of `thread.message.delta`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDelta {
    pub delta: MessageDeltaBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub content: Vec<DeltaContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaContent {
    Text {
        #[serde(default)]
        text: Option<DeltaText>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeltaText {
    #[serde(default)]
    pub value: Option<String>,
}

impl MessageDelta {
    /// Concatenated text of every text part in the delta.
    pub fn text(&self) -> String {
        self.delta
            .content
            .iter()
            .filter_map(|part| match part {
                DeltaContent::Text { text: Some(t) } => t.value.as_deref(),
                _ => None,
            })
            .collect()
    }
}

/// Error object of the `error` stream event and of non-2xx bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}
