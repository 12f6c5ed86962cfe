// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies of the chat service REST API.

use kai_core::types::{AiState, ChatMessage, ChatUser, MessageMetadata};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageBody<'a> {
    pub text: &'a str,
    pub user_id: &'a str,
    #[serde(rename = "extraData")]
    pub extra: &'a MessageMetadata,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateMessageBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    #[serde(rename = "extraData")]
    pub extra: &'a MessageMetadata,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelEventBody {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub state: AiState,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SentMessage {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageList {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelList {
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserList {
    #[serde(default)]
    pub users: Vec<ChatUser>,
}
