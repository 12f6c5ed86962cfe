// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.
//!
//! Handles GET /health, POST /v1/webhook and POST /v1/commands.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kai_agent::AgentRequest;
use kai_core::types::{Attachment, AttachmentKind, MentionedUser, MessageId, TimezoneContext};

use crate::server::GatewayState;

/// A user as it appears in webhook payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChannel {
    pub id: String,
}

/// An attachment as the chat platform sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookAttachment {
    /// `image` or anything else, which is treated as a file.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl WebhookAttachment {
    fn into_attachment(self) -> Option<Attachment> {
        let url = self.asset_url.or(self.image_url)?;
        let kind = if self.kind.eq_ignore_ascii_case("image") {
            AttachmentKind::Image
        } else {
            AttachmentKind::File
        };
        Some(Attachment {
            kind,
            url,
            mime_type: self.mime_type,
            name: self.title,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub user: Option<WebhookUser>,
    #[serde(default)]
    pub mentioned_users: Vec<MentionedUser>,
    #[serde(default)]
    pub attachments: Vec<WebhookAttachment>,
}

/// Request body for POST /v1/webhook.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<WebhookMessage>,
    #[serde(default)]
    pub user: Option<WebhookUser>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel: Option<WebhookChannel>,
    /// Memory mode for Kai channels. Defaults to persistent.
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub timezone: Option<TimezoneContext>,
}

impl WebhookEvent {
    fn channel_id(&self) -> Option<String> {
        self.channel_id
            .clone()
            .or_else(|| self.channel.as_ref().map(|c| c.id.clone()))
            .filter(|c| !c.is_empty())
    }
}

/// Request body for POST /v1/commands.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    /// Memory mode. Commands default to the ephemeral summary.
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub timezone: Option<TimezoneContext>,
}

/// Response body for accepted or ignored events.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<usize>,
}

impl EventResponse {
    fn accepted() -> Self {
        Self {
            status: "accepted",
            reason: None,
            stopped: None,
        }
    }

    fn ignored(reason: &'static str) -> Self {
        Self {
            status: "ignored",
            reason: Some(reason),
            stopped: None,
        }
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub live_handlers: usize,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        live_handlers: state.agent.stops().live(),
    })
}

/// POST /v1/webhook
///
/// `message.new` is handed to the agent in the background and answered
/// with 202. `ai_indicator.stop` cancels generation in the channel.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Json(event): Json<WebhookEvent>,
) -> Response {
    match event.kind.as_str() {
        "message.new" => handle_new_message(state, event),
        "ai_indicator.stop" => {
            let Some(channel_id) = event.channel_id() else {
                return bad_request("channel is required");
            };
            let stopped = state.agent.stop_generating(&channel_id);
            Json(EventResponse {
                status: "stopped",
                reason: None,
                stopped: Some(stopped),
            })
            .into_response()
        }
        other => {
            debug!(event_type = other, "ignoring webhook event");
            Json(EventResponse::ignored("unhandled event type")).into_response()
        }
    }
}

fn handle_new_message(state: GatewayState, event: WebhookEvent) -> Response {
    let Some(channel_id) = event.channel_id() else {
        return bad_request("channel is required");
    };
    let Some(message) = event.message else {
        return bad_request("message is required");
    };
    let Some(sender) = message.user.clone().or(event.user) else {
        return bad_request("user is required");
    };

    if sender.id == state.agent.bot_user_id() {
        return Json(EventResponse::ignored("bot message")).into_response();
    }
    if message.kind.as_deref() == Some("system") {
        return Json(EventResponse::ignored("system message")).into_response();
    }

    // Group messages get their metadata patched in place; Kai channels get a
    // new reply message.
    let message_id = (!state.agent.is_kai_channel(&channel_id)).then(|| MessageId(message.id.clone()));

    let request = AgentRequest {
        text: message.text,
        channel_id,
        user_id: sender.id,
        message_id,
        attachments: message
            .attachments
            .into_iter()
            .filter_map(WebhookAttachment::into_attachment)
            .collect(),
        persistent: event.persistent.unwrap_or(true),
        mentioned_users: message.mentioned_users,
        timezone: event.timezone,
    };
    info!(
        channel_id = %request.channel_id,
        user_id = %request.user_id,
        message_id = %message.id,
        "message accepted"
    );
    spawn_handler(&state, request);
    (StatusCode::ACCEPTED, Json(EventResponse::accepted())).into_response()
}

/// POST /v1/commands
pub async fn post_command(
    State(state): State<GatewayState>,
    Json(body): Json<CommandRequest>,
) -> Response {
    if body.channel_id.is_empty() || body.user_id.is_empty() {
        return bad_request("channel_id and user_id are required");
    }
    info!(
        command = %body.command,
        channel_id = %body.channel_id,
        user_id = %body.user_id,
        "command accepted"
    );
    let request = AgentRequest {
        text: body.text,
        channel_id: body.channel_id,
        user_id: body.user_id,
        persistent: body.persistent.unwrap_or(false),
        timezone: body.timezone,
        ..Default::default()
    };
    spawn_handler(&state, request);
    (StatusCode::ACCEPTED, Json(EventResponse::accepted())).into_response()
}

fn spawn_handler(state: &GatewayState, request: AgentRequest) {
    let agent = state.agent.clone();
    state.tasks.spawn(async move {
        let outcome = agent.handle_message(request).await;
        debug!(?outcome, "message handled");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_event_parses_platform_payload() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "message.new",
            "channel": {"id": "kai-u1"},
            "message": {
                "id": "m1",
                "text": "hi @Sarah",
                "user": {"id": "u1", "name": "Ana"},
                "mentioned_users": [{"id": "u7", "name": "Sarah"}],
                "attachments": [
                    {"type": "image", "image_url": "https://chat/i.png", "mime_type": "image/png"},
                    {"type": "file", "asset_url": "https://chat/r.pdf", "title": "report"},
                    {"type": "file"}
                ]
            }
        }))
        .unwrap();
        assert_eq!(event.channel_id().as_deref(), Some("kai-u1"));
        let message = event.message.unwrap();
        assert_eq!(message.mentioned_users[0].id, "u7");
        let attachments: Vec<Attachment> = message
            .attachments
            .into_iter()
            .filter_map(WebhookAttachment::into_attachment)
            .collect();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].kind, AttachmentKind::Image);
        assert_eq!(attachments[1].kind, AttachmentKind::File);
        assert_eq!(attachments[1].name.as_deref(), Some("report"));
    }

    #[test]
    fn channel_id_prefers_top_level_field() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "ai_indicator.stop",
            "channel_id": "kai-u2",
            "channel": {"id": "ignored"}
        }))
        .unwrap();
        assert_eq!(event.channel_id().as_deref(), Some("kai-u2"));
    }
}
