// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Kai backend.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Transport,
    Storage,
}

// --- Conversation types ---

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single typed block inside a multi-part turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Base64-encoded image forwarded as a vision block.
    Image {
        media_type: String,
        data: String,
    },
    /// A document previously uploaded to the provider's file store.
    File {
        file_id: String,
        filename: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Turn content: plain text or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Flattens the turn into plain text.
    ///
    /// Images and files become short placeholders, tool-use blocks are
    /// dropped and tool results contribute their content.
    pub fn text(&self) -> String {
        match &self.content {
            TurnContent::Text(t) => t.clone(),
            TurnContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.clone()),
                    ContentBlock::Image { .. } => Some("[image]".to_string()),
                    ContentBlock::File { filename, .. } => Some(format!("[file: {filename}]")),
                    ContentBlock::ToolUse { .. } => None,
                    ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                })
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Prepares a history for storage.
///
/// Keeps the most recent `window` turns, flattens each to text and truncates
/// it to `max_chars` characters. Turns that flatten to nothing are dropped.
pub fn trim_history(
    turns: &[ConversationTurn],
    window: usize,
    max_chars: usize,
) -> Vec<ConversationTurn> {
    let flattened: Vec<ConversationTurn> = turns
        .iter()
        .filter_map(|turn| {
            let text = turn.text();
            if text.trim().is_empty() {
                return None;
            }
            let cut = text.char_indices().nth(max_chars).map(|(i, _)| i);
            let text = match cut {
                Some(cut) => text[..cut].to_string(),
                None => text,
            };
            Some(ConversationTurn {
                role: turn.role,
                content: TurnContent::Text(text),
            })
        })
        .collect();

    let skip = flattened.len().saturating_sub(window);
    flattened.into_iter().skip(skip).collect()
}

/// Persisted mapping of a (channel, user) pair to a provider conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub channel_id: String,
    pub user_id: String,
    /// Provider handle: an OpenAI thread id or a synthetic id.
    pub provider_thread_id: String,
    pub conversation_history: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// --- Tool-call types ---

/// A tool invocation requested by the model mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// The single answer owed to a [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub output: String,
}

/// One completed tool-use round: what the model said and asked for, and the answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolTurn {
    pub assistant_text: String,
    pub calls: Vec<ToolCallRequest>,
    pub results: Vec<ToolCallResult>,
}

impl ToolTurn {
    /// Renders the round as history turns: the assistant tool-use turn
    /// followed by the user tool-result turn.
    pub fn into_turns(self) -> [ConversationTurn; 2] {
        let mut assistant_blocks = Vec::with_capacity(self.calls.len() + 1);
        if !self.assistant_text.trim().is_empty() {
            assistant_blocks.push(ContentBlock::Text {
                text: self.assistant_text,
            });
        }
        assistant_blocks.extend(self.calls.into_iter().map(|call| ContentBlock::ToolUse {
            id: call.id,
            name: call.name,
            input: call.input,
        }));

        let result_blocks = self
            .results
            .into_iter()
            .map(|r| ContentBlock::ToolResult {
                tool_use_id: r.tool_call_id,
                content: r.output,
                is_error: false,
            })
            .collect();

        [
            ConversationTurn {
                role: Role::Assistant,
                content: TurnContent::Blocks(assistant_blocks),
            },
            ConversationTurn {
                role: Role::User,
                content: TurnContent::Blocks(result_blocks),
            },
        ]
    }
}

/// Provider-neutral tool schema. Each provider adapter translates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: serde_json::Value,
}

// --- Provider types ---

/// Handle of an in-flight provider run, used for resumption and cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub thread_id: Option<String>,
    pub run_id: String,
}

/// Provider-agnostic streaming event.
///
/// Each provider adapter translates its wire events into this type. A stream
/// that ends after one or more `ToolCallRequested` events is a tool-use turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The provider created a cancellable run.
    RunStarted(RunHandle),
    TextDelta(String),
    ToolCallRequested(ToolCallRequest),
    StreamEnded { stop_reason: Option<String> },
}

/// A request to an LLM provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderRequest {
    /// Model override; providers fall back to their configured model.
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub messages: Vec<ConversationTurn>,
    pub tools: Vec<ToolDefinition>,
    /// Provider-side conversation handle. `None` means ephemeral.
    pub conversation_id: Option<String>,
    pub max_tokens: Option<u32>,
}

// --- Chat transport types ---

/// A user @-mentioned in the inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionedUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// An attachment carried by an inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The sender's local time zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneContext {
    /// IANA name for display, e.g. `Europe/Berlin`.
    #[serde(default)]
    pub name: Option<String>,
    /// Offset from UTC in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl TimezoneContext {
    /// The fixed offset, or UTC when the stored offset is out of range.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// A one-line description for prompts.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.offset());
        match &self.name {
            Some(name) => format!(
                "The user's timezone is {name} (UTC{}). Their local time is {}.",
                local.format("%:z"),
                local.format("%A %Y-%m-%d %H:%M")
            ),
            None => format!(
                "The user's UTC offset is {}. Their local time is {}.",
                local.format("%:z"),
                local.format("%A %Y-%m-%d %H:%M")
            ),
        }
    }
}

/// Message category as reported by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Regular,
    System,
    #[serde(other)]
    Other,
}

/// A message read back from chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub text: String,
    #[serde(default)]
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// `name: text`, falling back to the user id when no name is known.
    pub fn display_line(&self) -> String {
        let name = self.user_name.as_deref().unwrap_or(&self.user_id);
        format!("{name}: {}", self.text)
    }
}

/// A chat-platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
}

/// The "AI is working" indicator shown in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AiState {
    Thinking,
    Generating,
    Clear,
}

/// Extracted task fields. Empty values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<String>>,
}

/// Extracted event fields. Empty values are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
    /// Minutes before the start.
    pub reminder: u32,
}

/// Task/event decision derived from final model text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    pub is_task: bool,
    pub is_event: bool,
    pub task_data: Option<TaskData>,
    pub event_data: Option<EventData>,
}

/// Metadata attached to outgoing chat messages (the transport's `extraData`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub istask: bool,
    pub isevent: bool,
    #[serde(rename = "taskData", default, skip_serializing_if = "Option::is_none")]
    pub task_data: Option<TaskData>,
    #[serde(rename = "eventData", default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<EventData>,
    pub processing: bool,
}

impl MessageMetadata {
    /// Metadata for a message whose classification is not written yet.
    pub fn processing() -> Self {
        Self {
            processing: true,
            ..Self::default()
        }
    }
}

impl From<ClassificationResult> for MessageMetadata {
    fn from(c: ClassificationResult) -> Self {
        Self {
            istask: c.is_task,
            isevent: c.is_event,
            task_data: c.task_data,
            event_data: c.event_data,
            processing: false,
        }
    }
}

/// A new message to send into a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    /// Sender id, normally the bot user.
    pub user_id: String,
    pub extra: MessageMetadata,
}

/// A partial update of an existing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdate {
    /// New text, or `None` to leave the text untouched.
    #[serde(default)]
    pub text: Option<String>,
    pub extra: MessageMetadata,
}

/// A metadata patch recorded in the outbox before it is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPatch {
    pub message_id: MessageId,
    pub update: MessageUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_serializes_with_transport_field_names() {
        let meta = MessageMetadata {
            istask: true,
            isevent: false,
            task_data: Some(TaskData {
                title: Some("Call Sarah".into()),
                due_date: Some("2026-01-02".into()),
                ..TaskData::default()
            }),
            event_data: None,
            processing: false,
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            value,
            json!({
                "istask": true,
                "isevent": false,
                "taskData": {"title": "Call Sarah", "dueDate": "2026-01-02"},
                "processing": false
            })
        );
    }

    #[test]
    fn turn_text_flattens_blocks() {
        let turn = ConversationTurn {
            role: Role::User,
            content: TurnContent::Blocks(vec![
                ContentBlock::Text {
                    text: "see attached".into(),
                },
                ContentBlock::Image {
                    media_type: "image/png".into(),
                    data: "AAAA".into(),
                },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "get_tasks".into(),
                    input: json!({}),
                },
            ]),
        };
        assert_eq!(turn.text(), "see attached\n[image]");
    }

    #[test]
    fn trim_history_keeps_recent_window() {
        let turns: Vec<_> = (0..30).map(|i| ConversationTurn::user(format!("m{i}"))).collect();
        let trimmed = trim_history(&turns, 20, 2000);
        assert_eq!(trimmed.len(), 20);
        assert_eq!(trimmed[0].text(), "m10");
        assert_eq!(trimmed[19].text(), "m29");
    }

    #[test]
    fn trim_history_truncates_on_char_boundary() {
        let turns = vec![ConversationTurn::assistant("héllo wörld")];
        let trimmed = trim_history(&turns, 20, 4);
        assert_eq!(trimmed[0].text(), "héll");
    }

    #[test]
    fn trim_history_drops_empty_turns() {
        let turns = vec![
            ConversationTurn::user("hi"),
            ConversationTurn {
                role: Role::Assistant,
                content: TurnContent::Blocks(vec![ContentBlock::ToolUse {
                    id: "t".into(),
                    name: "get_tasks".into(),
                    input: json!({}),
                }]),
            },
        ];
        assert_eq!(trim_history(&turns, 20, 2000).len(), 1);
    }

    #[test]
    fn tool_turn_renders_assistant_then_results() {
        let turn = ToolTurn {
            assistant_text: "Creating it.".into(),
            calls: vec![ToolCallRequest {
                id: "call_1".into(),
                name: "create_task".into(),
                input: json!({"title": "X"}),
            }],
            results: vec![ToolCallResult {
                tool_call_id: "call_1".into(),
                output: r#"{"success":true}"#.into(),
            }],
        };
        let [assistant, user] = turn.into_turns();
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(user.role, Role::User);
        match user.content {
            TurnContent::Blocks(blocks) => assert!(matches!(
                &blocks[0],
                ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "call_1"
            )),
            TurnContent::Text(_) => panic!("expected blocks"),
        }
    }

    #[test]
    fn history_round_trips_through_json() {
        let turns = vec![ConversationTurn::user("hello"), ConversationTurn::assistant("hi")];
        let json = serde_json::to_string(&turns).unwrap();
        let back: Vec<ConversationTurn> = serde_json::from_str(&json).unwrap();
        assert_eq!(turns, back);
    }

    #[test]
    fn unknown_message_kind_maps_to_other() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": "m1",
            "channel_id": "c1",
            "user_id": "u1",
            "text": "joined",
            "kind": "ephemeral",
            "created_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Other);
        assert_eq!(msg.display_line(), "u1: joined");
    }

    #[test]
    fn timezone_offset_falls_back_to_utc() {
        let tz = TimezoneContext {
            name: None,
            utc_offset_minutes: 100_000,
        };
        assert_eq!(tz.offset().local_minus_utc(), 0);
    }

    proptest::proptest! {
        #[test]
        fn trimmed_history_respects_window_and_length(
            texts in proptest::collection::vec(".{0,40}", 0..30),
            window in 0usize..12,
            max_chars in 1usize..25,
        ) {
            let turns: Vec<ConversationTurn> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| if i % 2 == 0 {
                    ConversationTurn::user(t.clone())
                } else {
                    ConversationTurn::assistant(t.clone())
                })
                .collect();
            let trimmed = trim_history(&turns, window, max_chars);
            proptest::prop_assert!(trimmed.len() <= window);
            for turn in &trimmed {
                let text = turn.text();
                proptest::prop_assert!(text.chars().count() <= max_chars);
            }
        }
    }
}
