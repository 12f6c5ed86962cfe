// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task/event classification of final model output.
//!
//! Two output contracts are accepted: the legacy binary one (`"0"` / `"1"`)
//! and a JSON object with a `type` discriminator. Parsing never fails;
//! anything unrecognized falls back to a keyword heuristic.

use kai_core::types::{ClassificationResult, EventData, TaskData};
use serde_json::{Map, Value};

/// Reminder minutes used when event data carries none.
pub const DEFAULT_REMINDER_MINUTES: u32 = 15;

/// Words that mark a Kai reply as task-related when it is not JSON.
pub const TASK_KEYWORDS: &[&str] = &[
    "task",
    "todo",
    "to-do",
    "to do",
    "remind",
    "deadline",
    "due",
    "assign",
    "follow up",
    "follow-up",
];

/// Words that mark a message as being about the calendar.
pub const EVENT_KEYWORDS: &[&str] = &[
    "event",
    "meeting",
    "calendar",
    "schedule",
    "appointment",
    "call",
    "agenda",
];

/// Fallback rule applied when the output is not a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    /// Case-insensitive substring match against [`TASK_KEYWORDS`].
    Keywords,
    /// Exact match against the literal `"1"`.
    BinaryOne,
}

/// Classifies model output as a task, an event, or neither.
pub fn classify(text: &str, heuristic: Heuristic) -> ClassificationResult {
    let trimmed = text.trim();
    if trimmed == "0" {
        return ClassificationResult::default();
    }

    let body = strip_code_fence(trimmed);
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        return classify_object(&obj);
    }

    let is_task = match heuristic {
        Heuristic::Keywords => contains_any(trimmed, TASK_KEYWORDS),
        Heuristic::BinaryOne => trimmed == "1",
    };
    ClassificationResult {
        is_task,
        ..ClassificationResult::default()
    }
}

/// Case-insensitive check for any of `keywords` in `text`.
pub fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

fn classify_object(obj: &Map<String, Value>) -> ClassificationResult {
    match obj.get("type").and_then(Value::as_str).map(str::to_lowercase) {
        Some(kind) if kind == "task" => task_result(obj),
        Some(kind) if kind == "event" => ClassificationResult {
            is_event: true,
            event_data: Some(extract_event(obj)),
            ..ClassificationResult::default()
        },
        Some(_) => ClassificationResult::default(),
        None if obj.get("type").is_none() && looks_like_legacy_task(obj) => task_result(obj),
        None => ClassificationResult::default(),
    }
}

fn task_result(obj: &Map<String, Value>) -> ClassificationResult {
    ClassificationResult {
        is_task: true,
        task_data: Some(extract_task(obj)),
        ..ClassificationResult::default()
    }
}

fn looks_like_legacy_task(obj: &Map<String, Value>) -> bool {
    ["title", "description", "priority", "subtasks"]
        .iter()
        .any(|k| obj.contains_key(*k))
}

/// Removes a surrounding markdown code fence, with or without a language tag.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`), which ends at a newline or,
    // on a one-line fence, at the first non-alphabetic character.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let rest = rest.trim();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_task(obj: &Map<String, Value>) -> TaskData {
    TaskData {
        title: string_field(obj, "title"),
        description: string_field(obj, "description"),
        priority: string_field(obj, "priority").map(|p| p.to_lowercase()),
        due_date: string_field(obj, "dueDate"),
        assignees: list_field(obj, "assignees"),
        subtasks: list_field(obj, "subtasks"),
    }
}

fn extract_event(obj: &Map<String, Value>) -> EventData {
    EventData {
        title: string_field(obj, "title"),
        description: string_field(obj, "description"),
        start_date: string_field(obj, "startDate"),
        end_date: string_field(obj, "endDate"),
        location: string_field(obj, "location"),
        attendees: list_field(obj, "attendees"),
        reminder: reminder_field(obj).unwrap_or(DEFAULT_REMINDER_MINUTES),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A list of non-empty strings. Objects contribute their `title` or `name`.
fn list_field(obj: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = obj
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(o) => o
                .get("title")
                .or_else(|| o.get("name"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

fn reminder_field(obj: &Map<String, Value>) -> Option<u32> {
    match obj.get("reminder")? {
        Value::Number(n) => n.as_u64().and_then(|m| u32::try_from(m).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_is_neither() {
        for heuristic in [Heuristic::Keywords, Heuristic::BinaryOne] {
            let result = classify("  0 \n", heuristic);
            assert_eq!(result, ClassificationResult::default());
        }
    }

    #[test]
    fn binary_one_only_counts_for_detector() {
        assert!(classify("1", Heuristic::BinaryOne).is_task);
        assert!(!classify("11", Heuristic::BinaryOne).is_task);
        assert!(!classify("1", Heuristic::Keywords).is_task);
    }

    #[test]
    fn typed_task_drops_empty_fields_and_lowercases_priority() {
        let result = classify(
            r#"{"type":"task","title":"Call Sarah","description":"","priority":"HIGH","assignees":[],"dueDate":null,"subtasks":["dial",""]}"#,
            Heuristic::Keywords,
        );
        assert!(result.is_task);
        assert!(!result.is_event);
        let data = result.task_data.unwrap();
        assert_eq!(data.title.as_deref(), Some("Call Sarah"));
        assert_eq!(data.priority.as_deref(), Some("high"));
        assert_eq!(data.description, None);
        assert_eq!(data.assignees, None);
        assert_eq!(data.due_date, None);
        assert_eq!(data.subtasks, Some(vec!["dial".to_string()]));

        let json = serde_json::to_value(TaskData {
            title: Some("Call Sarah".into()),
            ..TaskData::default()
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"title": "Call Sarah"}));
    }

    #[test]
    fn typed_event_defaults_reminder() {
        let result = classify(
            r#"{"type":"event","title":"Launch","startDate":"2025-01-01T00:00:00Z"}"#,
            Heuristic::BinaryOne,
        );
        assert!(result.is_event);
        let data = result.event_data.unwrap();
        assert_eq!(data.reminder, 15);
        assert_eq!(data.start_date.as_deref(), Some("2025-01-01T00:00:00Z"));

        let result = classify(
            r#"{"type":"event","title":"Launch","reminder":"30"}"#,
            Heuristic::BinaryOne,
        );
        assert_eq!(result.event_data.unwrap().reminder, 30);
    }

    #[test]
    fn type_none_is_neither_even_with_keywords() {
        let result = classify(r#"{"type":"none","title":"task"}"#, Heuristic::Keywords);
        assert_eq!(result, ClassificationResult::default());
    }

    #[test]
    fn legacy_task_shape_without_type() {
        let result = classify(r#"{"title":"Ship it","priority":"Urgent"}"#, Heuristic::BinaryOne);
        assert!(result.is_task);
        assert_eq!(result.task_data.unwrap().priority.as_deref(), Some("urgent"));

        assert!(!classify(r#"{"answer":"42"}"#, Heuristic::Keywords).is_task);
    }

    #[test]
    fn fenced_json_matches_unfenced() {
        let raw = r#"{"type":"task","title":"X"}"#;
        let fenced = format!("```json\n{raw}\n```");
        let bare_fence = format!("```\n{raw}\n```");
        let expected = classify(raw, Heuristic::Keywords);
        assert_eq!(classify(&fenced, Heuristic::Keywords), expected);
        assert_eq!(classify(&bare_fence, Heuristic::Keywords), expected);
    }

    #[test]
    fn one_line_fence_with_language_tag() {
        let raw = r#"{"type":"task","title":"Ship it"}"#;
        let result = classify(&format!("```json {raw}```"), Heuristic::BinaryOne);
        assert_eq!(result, classify(raw, Heuristic::BinaryOne));
        assert_eq!(
            result.task_data.and_then(|t| t.title).as_deref(),
            Some("Ship it")
        );
    }

    #[test]
    fn keyword_heuristic_for_plain_text() {
        assert!(classify("I created the TASK for you.", Heuristic::Keywords).is_task);
        assert!(!classify("Good morning! Nothing new today.", Heuristic::Keywords).is_task);
        assert!(classify("I created the TASK for you.", Heuristic::Keywords).task_data.is_none());
    }

    proptest! {
        #[test]
        fn zero_padded_with_whitespace_is_never_work(pad_l in "[ \t\n]{0,4}", pad_r in "[ \t\n]{0,4}") {
            let text = format!("{pad_l}0{pad_r}");
            let result = classify(&text, Heuristic::Keywords);
            prop_assert!(!result.is_task && !result.is_event);
            prop_assert!(result.task_data.is_none() && result.event_data.is_none());
        }

        #[test]
        fn typed_task_keeps_its_title(title in "[A-Za-z][A-Za-z0-9 ]{0,30}") {
            let raw = serde_json::json!({"type": "task", "title": title}).to_string();
            let result = classify(&raw, Heuristic::BinaryOne);
            prop_assert!(result.is_task);
            let data = result.task_data.unwrap();
            prop_assert_eq!(data.title.as_deref(), Some(title.trim()));
            prop_assert!(data.description.is_none() && data.assignees.is_none());
        }

        #[test]
        fn fencing_never_changes_the_result(title in "[a-z]{1,12}", kind in prop::sample::select(vec!["task", "event", "none"])) {
            let raw = serde_json::json!({"type": kind, "title": title}).to_string();
            let fenced = format!("```json\n{raw}\n```");
            prop_assert_eq!(classify(&raw, Heuristic::Keywords), classify(&fenced, Heuristic::Keywords));
        }
    }
}
