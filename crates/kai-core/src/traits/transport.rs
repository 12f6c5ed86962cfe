// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat transport trait for the messaging platform the assistant lives in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::KaiError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AiState, ChatMessage, ChatUser, MessageId, MessageUpdate, OutgoingMessage};

/// Outbound side of the chat platform plus the history reads tools need.
#[async_trait]
pub trait ChatTransport: PluginAdapter {
    /// Sends a new message into a channel.
    async fn send_message(
        &self,
        channel_id: &str,
        message: OutgoingMessage,
    ) -> Result<MessageId, KaiError>;

    /// Partially updates an existing message (text and/or metadata).
    async fn update_message(
        &self,
        message_id: &MessageId,
        update: MessageUpdate,
    ) -> Result<(), KaiError>;

    /// Shows or clears the "AI thinking" indicator in a channel.
    async fn set_ai_state(&self, channel_id: &str, state: AiState) -> Result<(), KaiError>;

    /// Messages of a channel created in `[since, until]`, oldest first.
    async fn query_messages(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, KaiError>;

    /// Ids of the channels a user is a member of.
    async fn user_channels(&self, user_id: &str) -> Result<Vec<String>, KaiError>;

    /// Looks a user up by display name or username.
    async fn find_user(&self, name: &str) -> Result<Option<ChatUser>, KaiError>;

    /// Downloads an attachment's bytes.
    async fn fetch_attachment(&self, url: &str) -> Result<Vec<u8>, KaiError>;
}
