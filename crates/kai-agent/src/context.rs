// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context assembly for provider requests.
//!
//! Builds the system prompt sections (time zone, work summary, recent
//! activity) and the trailing history window sent with each request.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use kai_core::types::{ChatMessage, ConversationTurn, MessageKind, Role, TimezoneContext};
use kai_core::work::{Event, EventQuery, Task, TaskQuery, TaskStatus};
use kai_core::{ChatTransport, KaiError, WorkStore};
use tracing::debug;

use crate::classifier::{EVENT_KEYWORDS, TASK_KEYWORDS, contains_any};

/// Tasks and events listed in a summary.
const SUMMARY_ITEM_LIMIT: usize = 20;

/// Whether the message is about tasks or the calendar.
pub fn mentions_work(text: &str) -> bool {
    contains_any(text, TASK_KEYWORDS) || contains_any(text, EVENT_KEYWORDS)
}

/// Joins the base prompt with the time-zone line and any extra sections.
pub fn compose_system_prompt(
    base: &str,
    timezone: Option<&TimezoneContext>,
    now: DateTime<Utc>,
    sections: &[String],
) -> String {
    let mut prompt = base.trim().to_string();
    match timezone {
        Some(tz) => {
            prompt.push_str("\n\n");
            prompt.push_str(&tz.describe(now));
        }
        None => {
            prompt.push_str("\n\nThe current time is ");
            prompt.push_str(&now.format("%A %Y-%m-%d %H:%M UTC").to_string());
            prompt.push('.');
        }
    }
    for section in sections.iter().filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(section.trim());
    }
    prompt
}

/// The last `window` turns, never starting with an assistant turn.
pub fn request_window(history: &[ConversationTurn], window: usize) -> Vec<ConversationTurn> {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .skip_while(|turn| turn.role == Role::Assistant)
        .cloned()
        .collect()
}

/// Pending tasks and upcoming events of the user, as a prompt section.
pub async fn work_summary(
    work: &dyn WorkStore,
    user_id: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<String, KaiError> {
    let tasks = work
        .list_tasks(&TaskQuery {
            user_id: user_id.to_string(),
            status: Some(TaskStatus::Pending),
            limit: SUMMARY_ITEM_LIMIT,
        })
        .await?;
    let events = work
        .list_events(&EventQuery {
            user_id: user_id.to_string(),
            status: None,
            starting_after: Some(now),
            limit: SUMMARY_ITEM_LIMIT,
        })
        .await?;
    Ok(format_work(&tasks, &events, offset))
}

/// The daily summary context: the user's recent messages across all their
/// channels followed by the work summary.
pub async fn user_summary(
    transport: &dyn ChatTransport,
    work: &dyn WorkStore,
    user_id: &str,
    now: DateTime<Utc>,
    lookback_days: i64,
    offset: FixedOffset,
) -> Result<String, KaiError> {
    let since = now - Duration::days(lookback_days.max(1));
    let mut messages = Vec::new();
    for channel in transport.user_channels(user_id).await? {
        messages.extend(transport.query_messages(&channel, since, now).await?);
    }
    debug!(user_id, count = messages.len(), "summary messages loaded");

    let mut out = format_activity(&mut messages, lookback_days.max(1), offset);
    out.push_str("\n\n");
    out.push_str(&work_summary(work, user_id, now, offset).await?);
    Ok(out)
}

fn format_activity(messages: &mut [ChatMessage], lookback_days: i64, offset: FixedOffset) -> String {
    messages.sort_by_key(|m| m.created_at);
    let lines: Vec<String> = messages
        .iter()
        .filter(|m| m.kind != MessageKind::System)
        .map(|m| {
            format!(
                "[{} #{}] {}",
                m.created_at.with_timezone(&offset).format("%a %H:%M"),
                m.channel_id,
                m.display_line()
            )
        })
        .collect();
    if lines.is_empty() {
        format!("Recent messages: none in the last {lookback_days} days.")
    } else {
        format!("Recent messages (last {lookback_days} days):\n{}", lines.join("\n"))
    }
}

fn format_work(tasks: &[Task], events: &[Event], offset: FixedOffset) -> String {
    let mut out = String::new();
    if tasks.is_empty() {
        out.push_str("Pending tasks: none.");
    } else {
        out.push_str("Pending tasks:");
        for task in tasks {
            out.push_str(&format!(
                "\n- {} ({}, due {})",
                task.title,
                task.priority,
                task.completion_date.with_timezone(&offset).format("%Y-%m-%d %H:%M")
            ));
        }
    }
    out.push_str("\n\n");
    if events.is_empty() {
        out.push_str("Upcoming events: none.");
    } else {
        out.push_str("Upcoming events:");
        for event in events {
            out.push_str(&format!(
                "\n- {} at {}",
                event.title,
                event.start_date.with_timezone(&offset).format("%Y-%m-%d %H:%M")
            ));
            if let Some(location) = &event.location {
                out.push_str(&format!(" ({location})"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kai_core::work::{EventStatus, Priority};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn work_keywords() {
        assert!(mentions_work("what tasks are due this week?"));
        assert!(mentions_work("Any MEETING tomorrow"));
        assert!(!mentions_work("tell me a joke"));
    }

    #[test]
    fn system_prompt_includes_time_and_sections() {
        let prompt = compose_system_prompt("Base.", None, now(), &["Extra".into(), " ".into()]);
        assert_eq!(
            prompt,
            "Base.\n\nThe current time is Wednesday 2026-03-04 10:00 UTC.\n\nExtra"
        );

        let tz = TimezoneContext {
            name: Some("Asia/Tokyo".into()),
            utc_offset_minutes: 540,
        };
        let prompt = compose_system_prompt("Base.", Some(&tz), now(), &[]);
        assert!(prompt.contains("Asia/Tokyo"));
        assert!(prompt.contains("19:00"));
    }

    #[test]
    fn window_never_starts_with_assistant() {
        let history = vec![
            ConversationTurn::user("a"),
            ConversationTurn::assistant("b"),
            ConversationTurn::user("c"),
            ConversationTurn::assistant("d"),
            ConversationTurn::user("e"),
        ];
        let window = request_window(&history, 4);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].text(), "c");
        assert_eq!(request_window(&history, 10).len(), 5);
    }

    #[test]
    fn empty_summary_reads_as_none() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            format_activity(&mut [], 2, utc),
            "Recent messages: none in the last 2 days."
        );
        assert_eq!(
            format_work(&[], &[], utc),
            "Pending tasks: none.\n\nUpcoming events: none."
        );
    }

    #[test]
    fn work_lines_use_local_time() {
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        let task = Task {
            id: "t1".into(),
            title: "Send report".into(),
            description: None,
            priority: Priority::High,
            status: TaskStatus::Pending,
            completion_date: now(),
            assignees: vec!["u1".into()],
            subtasks: vec![],
            creator_id: "u1".into(),
            channel_id: "kai-u1".into(),
            created_at: now(),
        };
        let event = Event {
            id: "e1".into(),
            title: "Standup".into(),
            description: None,
            start_date: now(),
            end_date: now() + Duration::minutes(15),
            location: Some("Room 4".into()),
            attendees: vec!["u1".into()],
            reminder_minutes: 15,
            status: EventStatus::Scheduled,
            creator_id: "u1".into(),
            channel_id: "kai-u1".into(),
            created_at: now(),
        };
        let text = format_work(&[task], &[event], ist);
        assert!(text.contains("- Send report (high, due 2026-03-04 15:30)"));
        assert!(text.contains("- Standup at 2026-03-04 15:30 (Room 4)"));
    }
}
