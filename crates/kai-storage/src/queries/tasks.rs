// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task creation and listing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use kai_core::work::{NewTask, Priority, Task, TaskQuery, TaskStatus};
use kai_core::KaiError;
use rusqlite::{params, Row};

use crate::database::{format_timestamp, map_tr_err, parse_json, parse_timestamp, to_json, Database};

const TASK_COLUMNS: &str = "id, title, description, priority, status, completion_date, \
     assignees, subtasks, creator_id, channel_id, created_at";

/// Parses a strum-backed enum column.
pub(crate) fn parse_enum<T: FromStr>(idx: usize, raw: &str) -> Result<T, rusqlite::Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_task(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    let priority: String = row.get(3)?;
    let status: String = row.get(4)?;
    let completion_date: String = row.get(5)?;
    let assignees: String = row.get(6)?;
    let subtasks: String = row.get(7)?;
    let created_at: String = row.get(10)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: parse_enum::<Priority>(3, &priority)?,
        status: parse_enum::<TaskStatus>(4, &status)?,
        completion_date: parse_timestamp(5, &completion_date)?,
        assignees: parse_json(6, &assignees)?,
        subtasks: parse_json(7, &subtasks)?,
        creator_id: row.get(8)?,
        channel_id: row.get(9)?,
        created_at: parse_timestamp(10, &created_at)?,
    })
}

/// Inserts a pending task and returns the stored record.
pub async fn create_task(
    db: &Database,
    task: &NewTask,
    now: DateTime<Utc>,
) -> Result<Task, KaiError> {
    let record = Task {
        id: uuid::Uuid::new_v4().to_string(),
        title: task.title.clone(),
        description: task.description.clone(),
        priority: task.priority,
        status: TaskStatus::Pending,
        completion_date: task.completion_date,
        assignees: task.assignees.clone(),
        subtasks: task.subtasks.clone(),
        creator_id: task.creator_id.clone(),
        channel_id: task.channel_id.clone(),
        created_at: now,
    };
    let row = record.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO tasks ({TASK_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    row.id,
                    row.title,
                    row.description,
                    row.priority.to_string(),
                    row.status.to_string(),
                    format_timestamp(&row.completion_date),
                    to_json(&row.assignees)?,
                    to_json(&row.subtasks)?,
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

/// Tasks the user created or is assigned to, soonest due first.
pub async fn list_tasks(db: &Database, query: &TaskQuery) -> Result<Vec<Task>, KaiError> {
    let user_id = query.user_id.clone();
    let status = query.status.map(|s| s.to_string());
    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<Task>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE (creator_id = ?1
                        OR EXISTS (SELECT 1 FROM json_each(tasks.assignees) WHERE value = ?1))
                   AND (?2 IS NULL OR status = ?2)
                 ORDER BY completion_date ASC, created_at ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![user_id, status, limit], row_to_task)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
