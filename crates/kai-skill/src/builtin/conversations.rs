// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only chat history tools.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use kai_core::KaiError;
use kai_core::types::{ChatMessage, ChatUser, MessageKind};
use tracing::debug;

use super::ToolDeps;
use crate::dates::{end_of_local_day, parse_date};
use crate::mentions::resolve_one;
use crate::tool::{Tool, ToolContext, ToolOutput, str_arg};

const GROUP_LOOKBACK_DAYS: i64 = 2;
const USER_LOOKBACK_DAYS: i64 = 7;

fn format_lines(mut messages: Vec<ChatMessage>) -> Vec<String> {
    messages.sort_by_key(|m| m.created_at);
    messages
        .iter()
        .filter(|m| m.kind != MessageKind::System)
        .map(ChatMessage::display_line)
        .collect()
}

/// Messages of one channel over the two days ending with a given date.
pub struct FetchGroupConversationTool {
    deps: ToolDeps,
}

impl FetchGroupConversationTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for FetchGroupConversationTool {
    fn name(&self) -> &str {
        "fetch_group_conversation"
    }

    fn description(&self) -> &str {
        "Read recent messages of a group channel, up to the end of the given date."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "groupId": {"type": "string", "description": "Channel id of the group"},
                "date": {"type": "string", "description": "Last day to include; defaults to today"}
            },
            "required": ["groupId"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, KaiError> {
        let Some(group_id) = str_arg(&input, "groupId") else {
            return Ok(ToolOutput::failure("groupId is required"));
        };
        let offset = ctx.offset();
        let day = str_arg(&input, "date")
            .and_then(|d| parse_date(d, ctx.now, offset))
            .unwrap_or(ctx.now);
        let until = end_of_local_day(day, offset);
        let since = until - Duration::days(GROUP_LOOKBACK_DAYS);

        let messages = self
            .deps
            .transport
            .query_messages(group_id, since, until)
            .await?;
        let lines = format_lines(messages);
        debug!(group_id, count = lines.len(), "group conversation fetched");

        Ok(ToolOutput::success(serde_json::json!({
            "groupId": group_id,
            "count": lines.len(),
            "messages": lines,
        })))
    }
}

/// A user's messages across their channels over the last week.
pub struct FetchUserConversationsTool {
    deps: ToolDeps,
}

impl FetchUserConversationsTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }

    /// Mentioned users first, then the username cache, then the chat platform.
    async fn resolve_user(
        &self,
        username: &str,
        ctx: &ToolContext,
    ) -> Result<Option<ChatUser>, KaiError> {
        if let Some(user) = resolve_one(username, &ctx.mentioned_users) {
            return Ok(Some(ChatUser {
                id: user.id.clone(),
                name: user.name.clone(),
            }));
        }

        let key = username.trim().trim_start_matches('@').to_lowercase();
        if let Some(user) = self.deps.user_cache.get(&key) {
            return Ok(Some(user));
        }
        let found = self.deps.transport.find_user(&key).await?;
        if let Some(user) = &found {
            self.deps.user_cache.set(&key, user.clone());
        }
        Ok(found)
    }

    async fn history(
        &self,
        user: &ChatUser,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, KaiError> {
        let mut all = Vec::new();
        for channel in self.deps.transport.user_channels(&user.id).await? {
            all.extend(
                self.deps
                    .transport
                    .query_messages(&channel, since, until)
                    .await?,
            );
        }
        Ok(all)
    }
}

#[async_trait]
impl Tool for FetchUserConversationsTool {
    fn name(&self) -> &str {
        "fetch_user_conversations"
    }

    fn description(&self) -> &str {
        "Read the last week of messages from the channels a user belongs to."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "username": {"type": "string", "description": "Name of the user, as mentioned"}
            },
            "required": ["username"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, KaiError> {
        let Some(username) = str_arg(&input, "username") else {
            return Ok(ToolOutput::failure("username is required"));
        };
        let Some(user) = self.resolve_user(username, ctx).await? else {
            return Ok(ToolOutput::failure(format!("no user named {username}")));
        };

        let until = ctx.now;
        let since = until - Duration::days(USER_LOOKBACK_DAYS);
        let lines = format_lines(self.history(&user, since, until).await?);
        debug!(user_id = %user.id, count = lines.len(), "user conversations fetched");

        Ok(ToolOutput::success(serde_json::json!({
            "user": user,
            "count": lines.len(),
            "messages": lines,
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use kai_core::types::MentionedUser;
    use serde_json::json;

    use super::*;
    use crate::builtin::test_support::*;

    fn msg(channel: &str, user: &str, text: &str, at: DateTime<Utc>, kind: MessageKind) -> ChatMessage {
        ChatMessage {
            id: format!("{channel}-{text}"),
            channel_id: channel.into(),
            user_id: user.into(),
            user_name: Some(user.to_uppercase()),
            text: text.into(),
            kind,
            created_at: at,
        }
    }

    fn chat() -> MemoryChat {
        let t = |d, h| Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap();
        MemoryChat {
            messages: vec![
                msg("g1", "ann", "second", t(4, 9), MessageKind::Regular),
                msg("g1", "ann", "first", t(3, 9), MessageKind::Regular),
                msg("g1", "sys", "ann joined", t(3, 8), MessageKind::System),
                msg("g1", "ann", "too old", t(1, 9), MessageKind::Regular),
                msg("g2", "bob", "elsewhere", t(2, 9), MessageKind::Regular),
            ],
            users: vec![ChatUser {
                id: "bob".into(),
                name: "Bob".into(),
            }],
            channels: vec![("bob".into(), vec!["g1".into(), "g2".into()])],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn group_window_is_two_days_ending_today_without_system_messages() {
        let chat = Arc::new(chat());
        let tool = FetchGroupConversationTool::new(deps(Default::default(), chat.clone(), Default::default()));

        let out = tool.invoke(json!({"groupId": "g1"}), &ctx(vec![])).await.unwrap();
        let value = parse(&out.content);
        assert_eq!(value["messages"], json!(["ANN: first", "ANN: second"]));

        let (_, since, until) = chat.queries.lock().unwrap()[0].clone();
        assert_eq!(until, Utc.with_ymd_and_hms(2026, 3, 4, 23, 59, 59).unwrap() + Duration::milliseconds(999));
        assert_eq!(until - since, Duration::days(2));
    }

    #[tokio::test]
    async fn group_window_follows_explicit_date() {
        let chat = Arc::new(chat());
        let tool = FetchGroupConversationTool::new(deps(Default::default(), chat.clone(), Default::default()));
        let out = tool
            .invoke(json!({"groupId": "g1", "date": "2026-03-01"}), &ctx(vec![]))
            .await
            .unwrap();
        assert_eq!(parse(&out.content)["messages"], json!(["ANN: too old"]));
    }

    #[tokio::test]
    async fn user_conversations_span_all_channels_and_cache_the_lookup() {
        let chat = Arc::new(chat());
        let tool = FetchUserConversationsTool::new(deps(Default::default(), chat.clone(), Default::default()));

        let out = tool.invoke(json!({"username": "@Bob"}), &ctx(vec![])).await.unwrap();
        let value = parse(&out.content);
        assert_eq!(value["user"]["id"], "bob");
        assert_eq!(
            value["messages"],
            json!(["ANN: too old", "BOB: elsewhere", "ANN: first", "ANN: second"])
        );

        tool.invoke(json!({"username": "bob"}), &ctx(vec![])).await.unwrap();
        assert_eq!(*chat.find_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn mentioned_users_skip_the_lookup() {
        let chat = Arc::new(chat());
        let tool = FetchUserConversationsTool::new(deps(Default::default(), chat.clone(), Default::default()));
        let mentioned = vec![MentionedUser {
            id: "bob".into(),
            name: "Bobby".into(),
        }];
        let out = tool.invoke(json!({"username": "bobby"}), &ctx(mentioned)).await.unwrap();
        assert_eq!(parse(&out.content)["count"], 4);
        assert_eq!(*chat.find_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_user_is_a_tool_failure() {
        let tool = FetchUserConversationsTool::new(deps(Default::default(), Arc::new(chat()), Default::default()));
        let out = tool.invoke(json!({"username": "nobody"}), &ctx(vec![])).await.unwrap();
        assert!(out.is_error);
        assert_eq!(parse(&out.content)["error"], "no user named nobody");
    }
}
