// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interpretation of the date strings models put in tool arguments.
//!
//! Accepted forms: RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` (also with a
//! `T` separator and optional seconds), `today`, `tomorrow`, `next week`,
//! `in N minutes|hours|days|weeks`, and weekday names. Forms without a zone
//! are read in the caller's UTC offset.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a date expression, or `None` when it is not recognized.
pub fn parse_date(input: &str, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return local_to_utc(naive, offset);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return local_to_utc(date.and_hms_opt(0, 0, 0)?, offset);
    }

    parse_relative(&text.to_lowercase(), now, offset)
}

/// Due date of a task: the parsed expression, or one day from now when the
/// argument is absent or unrecognized.
pub fn interpret_due_date(
    input: Option<&str>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> DateTime<Utc> {
    input
        .and_then(|s| parse_date(s, now, offset))
        .unwrap_or(now + Duration::days(1))
}

/// The last instant of the local day containing `at`.
pub fn end_of_local_day(at: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = at.with_timezone(&offset).date_naive();
    local
        .and_hms_milli_opt(23, 59, 59, 999)
        .and_then(|naive| local_to_utc(naive, offset))
        .unwrap_or(at)
}

fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_relative(text: &str, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    match text {
        "now" | "today" => return Some(now),
        "tomorrow" => return Some(now + Duration::days(1)),
        "next week" => return Some(now + Duration::weeks(1)),
        _ => {}
    }

    if let Some(rest) = text.strip_prefix("in ") {
        let mut parts = rest.split_whitespace();
        let amount: i64 = parts.next()?.parse().ok()?;
        let unit = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let delta = match unit.trim_end_matches('s') {
            "minute" | "min" => Duration::try_minutes(amount),
            "hour" => Duration::try_hours(amount),
            "day" => Duration::try_days(amount),
            "week" => Duration::try_weeks(amount),
            _ => None,
        }?;
        return now.checked_add_signed(delta);
    }

    let day_name = text
        .strip_prefix("next ")
        .or_else(|| text.strip_prefix("on "))
        .unwrap_or(text);
    let target: Weekday = day_name.parse().ok()?;
    let today = now.with_timezone(&offset).weekday();
    let mut ahead =
        (7 + target.num_days_from_monday() as i64 - today.num_days_from_monday() as i64) % 7;
    if ahead == 0 {
        ahead = 7;
    }
    Some(now + Duration::days(ahead))
}
