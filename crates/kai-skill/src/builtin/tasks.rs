// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `create_task` and `get_tasks`.

use std::str::FromStr;

use async_trait::async_trait;
use kai_core::KaiError;
use kai_core::work::{NewTask, Notification, NotificationKind, Priority, Subtask, TaskQuery, TaskStatus};
use tracing::{debug, info};

use super::{ToolDeps, notify_best_effort};
use crate::dates::interpret_due_date;
use crate::mentions::resolve_mentions;
use crate::tool::{Tool, ToolContext, ToolOutput, limit_arg, str_arg, str_list_arg};

/// Creates a task and notifies its other assignees.
pub struct CreateTaskTool {
    deps: ToolDeps,
}

impl CreateTaskTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Create a task. Use when the user asks to be reminded of, assign, or track something to do."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short task title"},
                "description": {"type": "string", "description": "Optional details"},
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "urgent"],
                    "description": "Defaults to medium"
                },
                "dueDate": {
                    "type": "string",
                    "description": "ISO 8601 date or time, or words like 'tomorrow', 'friday', 'in 3 days'"
                },
                "assignees": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Names of mentioned users; defaults to the requester"
                },
                "subtasks": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["title"]
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

        let priority = str_arg(&input, "priority")
            .and_then(|p| Priority::from_str(p).ok())
            .unwrap_or_default();
        let completion_date = interpret_due_date(str_arg(&input, "dueDate"), ctx.now, ctx.offset());
        let assignees = resolve_mentions(
            &str_list_arg(&input, "assignees"),
            &ctx.mentioned_users,
            &ctx.user_id,
        );
        let subtasks = str_list_arg(&input, "subtasks")
            .into_iter()
            .map(|title| Subtask {
                title,
                completed: false,
            })
            .collect();

        let task = self
            .deps
            .work
            .create_task(&NewTask {
                title: title.to_string(),
                description: str_arg(&input, "description").map(str::to_string),
                priority,
                completion_date,
                assignees,
                subtasks,
                creator_id: ctx.user_id.clone(),
                channel_id: ctx.channel_id.clone(),
            })
            .await?;
        info!(task_id = %task.id, user_id = %ctx.user_id, "task created");

        notify_best_effort(
            self.deps.notifier.as_ref(),
            Notification {
                kind: NotificationKind::TaskAssigned,
                recipients: task
                    .assignees
                    .iter()
                    .filter(|id| **id != ctx.user_id)
                    .cloned()
                    .collect(),
                title: "New task assigned".to_string(),
                body: task.title.clone(),
                reference_id: task.id.clone(),
            },
        )
        .await;

        Ok(ToolOutput::success(serde_json::json!({ "task": task })))
    }
}

/// Lists tasks the caller created or is assigned to.
pub struct GetTasksTool {
    deps: ToolDeps,
}

impl GetTasksTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for GetTasksTool {
    fn name(&self) -> &str {
        "get_tasks"
    }

    fn description(&self) -> &str {
        "List the user's tasks, soonest due first."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed", "cancelled"]
                },
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
            Some(s) => match TaskStatus::from_str(s) {
                Ok(status) => Some(status),
                Err(_) => return Ok(ToolOutput::failure(format!("unknown task status: {s}"))),
            },
            None => None,
        };

        let tasks = self
            .deps
            .work
            .list_tasks(&TaskQuery {
                user_id: ctx.user_id.clone(),
                status,
                limit: limit_arg(&input),
            })
            .await?;
        debug!(user_id = %ctx.user_id, count = tasks.len(), "tasks listed");

        Ok(ToolOutput::success(
            serde_json::json!({ "count": tasks.len(), "tasks": tasks }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use kai_core::types::MentionedUser;
    use serde_json::json;

    use super::*;
    use crate::builtin::test_support::*;

    fn sarah() -> MentionedUser {
        MentionedUser {
            id: "u1".into(),
            name: "Sarah".into(),
        }
    }

    #[tokio::test]
    async fn creates_task_with_defaults_and_resolved_assignee() {
        let work = Arc::new(MemoryWork::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let tool = CreateTaskTool::new(deps(work.clone(), Default::default(), notifier.clone()));

        let out = tool
            .invoke(
                json!({"title": "Call Sarah", "dueDate": "tomorrow", "assignees": ["Sarah"]}),
                &ctx(vec![sarah()]),
            )
            .await
            .unwrap();
        let value = parse(&out.content);
        assert_eq!(value["success"], true);
        assert_eq!(value["task"]["title"], "Call Sarah");
        assert_eq!(value["task"]["priority"], "medium");
        assert_eq!(value["task"]["assignees"], json!(["u1"]));

        let stored = work.tasks.lock().unwrap()[0].clone();
        assert_eq!(stored.completion_date, now() + Duration::days(1));
        assert_eq!(stored.creator_id, "me");

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["u1"]);
    }

    #[tokio::test]
    async fn missing_title_is_reported_not_raised() {
        let work = Arc::new(MemoryWork::default());
        let tool = CreateTaskTool::new(deps(work.clone(), Default::default(), Default::default()));
        let out = tool.invoke(json!({"priority": "high"}), &ctx(vec![])).await.unwrap();
        assert!(out.is_error);
        assert_eq!(parse(&out.content)["error"], "title is required");
        assert!(work.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn priority_is_lowercased_and_unknown_falls_back() {
        let work = Arc::new(MemoryWork::default());
        let tool = CreateTaskTool::new(deps(work.clone(), Default::default(), Default::default()));
        tool.invoke(json!({"title": "a", "priority": "HIGH"}), &ctx(vec![]))
            .await
            .unwrap();
        tool.invoke(json!({"title": "b", "priority": "asap"}), &ctx(vec![]))
            .await
            .unwrap();
        let tasks = work.tasks.lock().unwrap();
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks[1].priority, Priority::Medium);
    }

    #[tokio::test]
    async fn self_assigned_task_sends_no_notification_and_failures_are_swallowed() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let tool = CreateTaskTool::new(deps(Default::default(), Default::default(), notifier.clone()));

        let out = tool
            .invoke(json!({"title": "solo"}), &ctx(vec![]))
            .await
            .unwrap();
        assert_eq!(parse(&out.content)["task"]["assignees"], json!(["me"]));

        let out = tool
            .invoke(json!({"title": "shared", "assignees": ["sarah"]}), &ctx(vec![sarah()]))
            .await
            .unwrap();
        assert_eq!(parse(&out.content)["success"], true);
    }

    #[tokio::test]
    async fn get_tasks_filters_by_user_and_reports_count() {
        let work = Arc::new(MemoryWork::default());
        let d = deps(work.clone(), Default::default(), Default::default());
        let create = CreateTaskTool::new(d.clone());
        create.invoke(json!({"title": "mine"}), &ctx(vec![])).await.unwrap();
        let mut other = ctx(vec![]);
        other.user_id = "someone-else".into();
        create.invoke(json!({"title": "theirs"}), &other).await.unwrap();

        let out = GetTasksTool::new(d)
            .invoke(json!({"status": "pending", "limit": 5}), &ctx(vec![]))
            .await
            .unwrap();
        let value = parse(&out.content);
        assert_eq!(value["count"], 1);
        assert_eq!(value["tasks"][0]["title"], "mine");
    }

    #[tokio::test]
    async fn get_tasks_rejects_unknown_status() {
        let tool = GetTasksTool::new(deps(Default::default(), Default::default(), Default::default()));
        let out = tool.invoke(json!({"status": "someday"}), &ctx(vec![])).await.unwrap();
        assert!(out.is_error);
    }
}
