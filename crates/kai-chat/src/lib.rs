// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP chat-transport adapter.
//!
//! Implements [`ChatTransport`] and [`Notifier`] over the chat service's REST
//! API. Every request carries the server-side API key as a bearer token;
//! non-2xx responses become [`KaiError::Transport`] with status and body.

mod wire;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kai_config::model::ChatConfig;
use kai_core::traits::{ChatTransport, Notifier, PluginAdapter};
use kai_core::types::{
    AdapterType, AiState, ChatMessage, ChatUser, HealthStatus, MessageId, MessageUpdate,
    OutgoingMessage,
};
use kai_core::work::Notification;
use kai_core::KaiError;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::wire::{
    ChannelEventBody, ChannelList, MessageList, SendMessageBody, SentMessage, UpdateMessageBody,
    UserList,
};

/// Chat transport backed by the chat service REST API.
pub struct HttpChatTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpChatTransport {
    pub fn new(config: &ChatConfig) -> Result<Self, KaiError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KaiError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, KaiError> {
        let response = builder.send().await.map_err(|e| self.request_failed(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(KaiError::transport(format!(
            "chat service returned {status}: {body}"
        )))
    }

    async fn send_json<R: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<R, KaiError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| self.request_failed(e))
    }

    fn request_failed(&self, e: reqwest::Error) -> KaiError {
        if e.is_timeout() {
            return KaiError::Timeout {
                duration: self.timeout,
            };
        }
        KaiError::Transport {
            message: format!("chat request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn build_url(base: &str, params: &[(&str, &str)]) -> Result<Url, KaiError> {
    Url::parse_with_params(base, params).map_err(|e| KaiError::Transport {
        message: format!("invalid chat URL {base}: {e}"),
        source: Some(Box::new(e)),
    })
}

#[async_trait]
impl PluginAdapter for HttpChatTransport {
    fn name(&self) -> &str {
        "http-chat"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, KaiError> {
        match self.send(self.request(Method::GET, self.url("/health"))).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(format!(
                "chat service unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), KaiError> {
        debug!("chat transport shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send_message(
        &self,
        channel_id: &str,
        message: OutgoingMessage,
    ) -> Result<MessageId, KaiError> {
        let body = SendMessageBody {
            text: &message.text,
            user_id: &message.user_id,
            extra: &message.extra,
        };
        let sent: SentMessage = self
            .send_json(
                self.request(Method::POST, self.url(&format!("/channels/{channel_id}/messages")))
                    .json(&body),
            )
            .await?;
        debug!(channel_id, message_id = %sent.id, "message sent");
        Ok(MessageId(sent.id))
    }

    async fn update_message(
        &self,
        message_id: &MessageId,
        update: MessageUpdate,
    ) -> Result<(), KaiError> {
        let body = UpdateMessageBody {
            text: update.text.as_deref(),
            extra: &update.extra,
        };
        self.send(
            self.request(Method::PATCH, self.url(&format!("/messages/{message_id}")))
                .json(&body),
        )
        .await?;
        debug!(message_id = %message_id, "message updated");
        Ok(())
    }

    async fn set_ai_state(&self, channel_id: &str, state: AiState) -> Result<(), KaiError> {
        let body = ChannelEventBody {
            event_type: "ai_indicator",
            state,
        };
        self.send(
            self.request(Method::POST, self.url(&format!("/channels/{channel_id}/events")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn query_messages(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, KaiError> {
        let (since, until) = (timestamp(since), timestamp(until));
        let url = build_url(
            &self.url(&format!("/channels/{channel_id}/messages")),
            &[("since", since.as_str()), ("until", until.as_str())],
        )?;
        let list: MessageList = self.send_json(self.request(Method::GET, url)).await?;
        Ok(list.messages)
    }

    async fn user_channels(&self, user_id: &str) -> Result<Vec<String>, KaiError> {
        let list: ChannelList = self
            .send_json(self.request(Method::GET, self.url(&format!("/users/{user_id}/channels"))))
            .await?;
        Ok(list.channels)
    }

    async fn find_user(&self, name: &str) -> Result<Option<ChatUser>, KaiError> {
        let url = build_url(&self.url("/users"), &[("name", name)])?;
        let list: UserList = self.send_json(self.request(Method::GET, url)).await?;

        // Prefer an exact (case-insensitive) name match over the service's ranking.
        let exact = list
            .users
            .iter()
            .position(|u| u.name.eq_ignore_ascii_case(name));
        let mut users = list.users;
        Ok(match exact {
            Some(i) => Some(users.swap_remove(i)),
            None => users.into_iter().next(),
        })
    }

    async fn fetch_attachment(&self, url: &str) -> Result<Vec<u8>, KaiError> {
        // Credentials only go to the chat service itself.
        let builder = if url.starts_with(&self.base_url) {
            self.request(Method::GET, url)
        } else {
            self.client.get(url)
        };
        let bytes = self
            .send(builder)
            .await?
            .bytes()
            .await
            .map_err(|e| self.request_failed(e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Notifier for HttpChatTransport {
    async fn notify(&self, notification: &Notification) -> Result<(), KaiError> {
        if notification.recipients.is_empty() {
            return Ok(());
        }
        self.send(
            self.request(Method::POST, self.url("/notifications"))
                .json(notification),
        )
        .await
        .map_err(|e| {
            warn!(reference_id = %notification.reference_id, error = %e, "notification failed");
            KaiError::Notification(e.to_string())
        })?;
        Ok(())
    }
}
