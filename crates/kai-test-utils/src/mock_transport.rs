// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat transport and notifier for deterministic testing.
//!
//! `MockTransport` implements `ChatTransport` over in-memory state: seeded
//! channel history, users and attachments are served back, and every send,
//! update and indicator change is captured for assertion in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use kai_core::types::{
    AdapterType, AiState, ChatMessage, ChatUser, HealthStatus, MessageId, MessageUpdate,
    OutgoingMessage,
};
use kai_core::work::Notification;
use kai_core::{ChatTransport, KaiError, Notifier, PluginAdapter};

/// A message captured by `send_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub id: MessageId,
    pub channel_id: String,
    pub message: OutgoingMessage,
}

#[derive(Default)]
struct State {
    sent: Vec<SentMessage>,
    updates: Vec<(MessageId, MessageUpdate)>,
    ai_states: Vec<(String, AiState)>,
    messages: Vec<ChatMessage>,
    memberships: HashMap<String, Vec<String>>,
    users: Vec<ChatUser>,
    attachments: HashMap<String, Vec<u8>>,
}

/// An in-memory chat platform.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicUsize>,
    fail_updates: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a channel message returned by `query_messages`.
    pub async fn add_message(&self, message: ChatMessage) {
        self.state.lock().await.messages.push(message);
    }

    /// Registers a user that `find_user` can resolve.
    pub async fn add_user(&self, id: &str, name: &str) {
        self.state.lock().await.users.push(ChatUser {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Makes `user_id` a member of `channel_id`.
    pub async fn add_membership(&self, user_id: &str, channel_id: &str) {
        self.state
            .lock()
            .await
            .memberships
            .entry(user_id.to_string())
            .or_default()
            .push(channel_id.to_string());
    }

    /// Serves `bytes` for attachment `url`. Unknown urls fail to download.
    pub async fn add_attachment(&self, url: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .await
            .attachments
            .insert(url.to_string(), bytes);
    }

    /// Makes `update_message` fail until reset.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Makes `send_message` fail until reset.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    pub async fn updates(&self) -> Vec<(MessageId, MessageUpdate)> {
        self.state.lock().await.updates.clone()
    }

    /// Indicator changes for one channel, in order.
    pub async fn ai_states(&self, channel_id: &str) -> Vec<AiState> {
        self.state
            .lock()
            .await
            .ai_states
            .iter()
            .filter(|(c, _)| c == channel_id)
            .map(|(_, s)| *s)
            .collect()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, KaiError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), KaiError> {
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(
        &self,
        channel_id: &str,
        message: OutgoingMessage,
    ) -> Result<MessageId, KaiError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(KaiError::transport("send rejected"));
        }
        let id = MessageId(format!(
            "mock-msg-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        ));
        self.state.lock().await.sent.push(SentMessage {
            id: id.clone(),
            channel_id: channel_id.to_string(),
            message,
        });
        Ok(id)
    }

    async fn update_message(
        &self,
        message_id: &MessageId,
        update: MessageUpdate,
    ) -> Result<(), KaiError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(KaiError::transport("update rejected"));
        }
        self.state
            .lock()
            .await
            .updates
            .push((message_id.clone(), update));
        Ok(())
    }

    async fn set_ai_state(&self, channel_id: &str, state: AiState) -> Result<(), KaiError> {
        self.state
            .lock()
            .await
            .ai_states
            .push((channel_id.to_string(), state));
        Ok(())
    }

    async fn query_messages(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, KaiError> {
        let mut found: Vec<ChatMessage> = self
            .state
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id && m.created_at >= since && m.created_at <= until)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        Ok(found)
    }

    async fn user_channels(&self, user_id: &str) -> Result<Vec<String>, KaiError> {
        Ok(self
            .state
            .lock()
            .await
            .memberships
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_user(&self, name: &str) -> Result<Option<ChatUser>, KaiError> {
        let name = name.trim_start_matches('@');
        Ok(self
            .state
            .lock()
            .await
            .users
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn fetch_attachment(&self, url: &str) -> Result<Vec<u8>, KaiError> {
        self.state
            .lock()
            .await
            .attachments
            .get(url)
            .cloned()
            .ok_or_else(|| KaiError::transport(format!("attachment not found: {url}")))
    }
}

/// Captures notifications instead of delivering them.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: Arc<AtomicBool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery fail until reset.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), KaiError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(KaiError::Notification("delivery failed".into()));
        }
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
