// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task and event records created by tool handlers.
//!
//! Their lifecycle (completion, RSVP, cancellation) is owned elsewhere; this
//! crate only defines the creation payloads and the records read back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Task priority. Parsing is case-insensitive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// Creation payload for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub completion_date: DateTime<Utc>,
    /// Resolved user ids.
    pub assignees: Vec<String>,
    pub subtasks: Vec<Subtask>,
    pub creator_id: String,
    pub channel_id: String,
}

/// A persisted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub completion_date: DateTime<Utc>,
    pub assignees: Vec<String>,
    pub subtasks: Vec<Subtask>,
    pub creator_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
}

/// Creation payload for a calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: Option<String>,
    /// Resolved user ids.
    pub attendees: Vec<String>,
    pub reminder_minutes: u32,
    pub creator_id: String,
    pub channel_id: String,
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub reminder_minutes: u32,
    pub status: EventStatus,
    pub creator_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
}

/// Filter for tasks the user created or is assigned to.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQuery {
    pub user_id: String,
    pub status: Option<TaskStatus>,
    pub limit: usize,
}

/// Filter for events the user created or attends.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub user_id: String,
    pub status: Option<EventStatus>,
    /// Only events starting at or after this instant.
    pub starting_after: Option<DateTime<Utc>>,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    EventInvitation,
}

/// A best-effort notification about a new task or event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipients: Vec<String>,
    pub title: String,
    pub body: String,
    /// Id of the task or event this notification is about.
    pub reference_id: String,
}
