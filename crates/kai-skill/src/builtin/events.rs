// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `create_event` and `get_events`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Duration;
use kai_core::KaiError;
use kai_core::work::{EventQuery, EventStatus, NewEvent, Notification, NotificationKind};
use tracing::{debug, info};

use super::{ToolDeps, notify_best_effort};
use crate::dates::parse_date;
use crate::mentions::resolve_mentions;
use crate::tool::{Tool, ToolContext, ToolOutput, limit_arg, str_arg, str_list_arg};

/// Minutes before the start when no reminder is given.
pub const DEFAULT_REMINDER_MINUTES: u32 = 15;

/// Creates a calendar event and invites its other attendees.
pub struct CreateEventTool {
    deps: ToolDeps,
}

impl CreateEventTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for CreateEventTool {
    fn name(&self) -> &str {
        "create_event"
    }

    fn description(&self) -> &str {
        "Create a calendar event such as a meeting or call at a specific time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"},
                "startDate": {"type": "string", "description": "ISO 8601 start time"},
                "endDate": {"type": "string", "description": "ISO 8601 end time; defaults to one hour after the start"},
                "location": {"type": "string"},
                "attendees": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Names of mentioned users; defaults to the requester"
                },
                "reminder": {"type": "integer", "description": "Minutes before the start; defaults to 15"}
            },
            "required": ["title", "startDate"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, KaiError> {
        let Some(title) = str_arg(&input, "title") else {
            return Ok(ToolOutput::failure("title is required"));
        };
        let Some(raw_start) = str_arg(&input, "startDate") else {
            return Ok(ToolOutput::failure("startDate is required"));
        };
        let offset = ctx.offset();
        let Some(start_date) = parse_date(raw_start, ctx.now, offset) else {
            return Ok(ToolOutput::failure(format!(
                "startDate is not a recognizable date: {raw_start}"
            )));
        };
        let end_date = str_arg(&input, "endDate")
            .and_then(|s| parse_date(s, ctx.now, offset))
            .filter(|end| *end > start_date)
            .unwrap_or(start_date + Duration::hours(1));
        let reminder_minutes = input
            .get("reminder")
            .and_then(serde_json::Value::as_u64)
            .and_then(|m| u32::try_from(m).ok())
            .unwrap_or(DEFAULT_REMINDER_MINUTES);
        let attendees = resolve_mentions(
            &str_list_arg(&input, "attendees"),
            &ctx.mentioned_users,
            &ctx.user_id,
        );

        let event = self
            .deps
            .work
            .create_event(&NewEvent {
                title: title.to_string(),
                description: str_arg(&input, "description").map(str::to_string),
                start_date,
                end_date,
                location: str_arg(&input, "location").map(str::to_string),
                attendees,
                reminder_minutes,
                creator_id: ctx.user_id.clone(),
                channel_id: ctx.channel_id.clone(),
            })
            .await?;
        info!(event_id = %event.id, user_id = %ctx.user_id, "event created");

        notify_best_effort(
            self.deps.notifier.as_ref(),
            Notification {
                kind: NotificationKind::EventInvitation,
                recipients: event
                    .attendees
                    .iter()
                    .filter(|id| **id != ctx.user_id)
                    .cloned()
                    .collect(),
                title: "New event invitation".to_string(),
                body: format!("{} at {}", event.title, event.start_date.to_rfc3339()),
                reference_id: event.id.clone(),
            },
        )
        .await;

        Ok(ToolOutput::success(serde_json::json!({ "event": event })))
    }
}

/// Lists events the caller created or attends.
pub struct GetEventsTool {
    deps: ToolDeps,
}

impl GetEventsTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for GetEventsTool {
    fn name(&self) -> &str {
        "get_events"
    }

    fn description(&self) -> &str {
        "List the user's calendar events in start order."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["scheduled", "completed", "cancelled"]},
                "upcoming": {"type": "boolean", "description": "Only events that have not started; defaults to true"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 50, "description": "Defaults to 10"}
            }
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, KaiError> {
        let status = match str_arg(&input, "status") {
            Some(s) => match EventStatus::from_str(s) {
                Ok(status) => Some(status),
                Err(_) => return Ok(ToolOutput::failure(format!("unknown event status: {s}"))),
            },
            None => None,
        };
        let upcoming = input
            .get("upcoming")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);

        let events = self
            .deps
            .work
            .list_events(&EventQuery {
                user_id: ctx.user_id.clone(),
                status,
                starting_after: upcoming.then_some(ctx.now),
                limit: limit_arg(&input),
            })
            .await?;
        debug!(user_id = %ctx.user_id, count = events.len(), upcoming, "events listed");

        Ok(ToolOutput::success(
            serde_json::json!({ "count": events.len(), "events": events }),
        ))
    }
}
