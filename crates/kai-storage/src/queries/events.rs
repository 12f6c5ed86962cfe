// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Calendar event creation and listing.

use chrono::{DateTime, Utc};
use kai_core::work::{Event, EventQuery, EventStatus, NewEvent};
use kai_core::KaiError;
use rusqlite::{params, Row};

use crate::database::{format_timestamp, map_tr_err, parse_json, parse_timestamp, to_json, Database};
use crate::queries::tasks::parse_enum;

const EVENT_COLUMNS: &str = "id, title, description, start_date, end_date, location, \
     attendees, reminder_minutes, status, creator_id, channel_id, created_at";

fn row_to_event(row: &Row<'_>) -> Result<Event, rusqlite::Error> {
    let start_date: String = row.get(3)?;
    let end_date: String = row.get(4)?;
    let attendees: String = row.get(6)?;
    let status: String = row.get(8)?;
    let created_at: String = row.get(11)?;
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_date: parse_timestamp(3, &start_date)?,
        end_date: parse_timestamp(4, &end_date)?,
        location: row.get(5)?,
        attendees: parse_json(6, &attendees)?,
        reminder_minutes: row.get(7)?,
        status: parse_enum::<EventStatus>(8, &status)?,
        creator_id: row.get(9)?,
        channel_id: row.get(10)?,
        created_at: parse_timestamp(11, &created_at)?,
    })
}

/// Inserts a scheduled event and returns the stored record.
pub async fn create_event(
    db: &Database,
    event: &NewEvent,
    now: DateTime<Utc>,
) -> Result<Event, KaiError> {
    let record = Event {
        id: uuid::Uuid::new_v4().to_string(),
        title: event.title.clone(),
        description: event.description.clone(),
        start_date: event.start_date,
        end_date: event.end_date,
        location: event.location.clone(),
        attendees: event.attendees.clone(),
        reminder_minutes: event.reminder_minutes,
        status: EventStatus::Scheduled,
        creator_id: event.creator_id.clone(),
        channel_id: event.channel_id.clone(),
        created_at: now,
    };
    let row = record.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO events ({EVENT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    row.id,
                    row.title,
                    row.description,
                    format_timestamp(&row.start_date),
                    format_timestamp(&row.end_date),
                    row.location,
                    to_json(&row.attendees)?,
                    row.reminder_minutes,
                    row.status.to_string(),
                    row.creator_id,
                    row.channel_id,
                    format_timestamp(&row.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(record)
}

/// Events the user created or attends, earliest first.
pub async fn list_events(db: &Database, query: &EventQuery) -> Result<Vec<Event>, KaiError> {
    let user_id = query.user_id.clone();
    let status = query.status.map(|s| s.to_string());
    let starting_after = query.starting_after.as_ref().map(format_timestamp);
    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<Event>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE (creator_id = ?1
                        OR EXISTS (SELECT 1 FROM json_each(events.attendees) WHERE value = ?1))
                   AND (?2 IS NULL OR status = ?2)
                   AND (?3 IS NULL OR start_date >= ?3)
                 ORDER BY start_date ASC
                 LIMIT ?4"
            ))?;
            let rows =
                stmt.query_map(params![user_id, status, starting_after, limit], row_to_event)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 14, 0, 0).unwrap()
    }

    fn new_event(title: &str, attendees: &[&str], offset_hours: i64) -> NewEvent {
        let start = base() + Duration::hours(offset_hours);
        NewEvent {
            title: title.to_string(),
            description: Some("weekly sync".to_string()),
            start_date: start,
            end_date: start + Duration::hours(1),
            location: None,
            attendees: attendees.iter().map(|a| a.to_string()).collect(),
            reminder_minutes: 15,
            creator_id: "u1".to_string(),
            channel_id: "c1".to_string(),
        }
    }

    #[tokio::test]
    async fn attendee_sees_upcoming_events_only() {
        let (db, _dir) = setup_db().await;
        let created = create_event(&db, &new_event("Standup", &["u2"], 24), base())
            .await
            .unwrap();
        create_event(&db, &new_event("Retro", &["u2"], -24), base())
            .await
            .unwrap();

        let upcoming = list_events(
            &db,
            &EventQuery {
                user_id: "u2".to_string(),
                status: Some(EventStatus::Scheduled),
                starting_after: Some(base()),
                limit: 10,
            },
        )
        .await
        .unwrap();
        assert_eq!(upcoming, vec![created]);

        let none = list_events(
            &db,
            &EventQuery {
                user_id: "u9".to_string(),
                status: None,
                starting_after: None,
                limit: 10,
            },
        )
        .await
        .unwrap();
        assert!(none.is_empty());

        db.close().await.unwrap();
    }
}
