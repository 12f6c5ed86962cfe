// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread upsert, lookup, history, and expiry.

use chrono::{DateTime, Duration, Utc};
use kai_core::types::{ConversationTurn, Thread};
use kai_core::KaiError;
use rusqlite::{params, Row};

use crate::database::{format_timestamp, map_tr_err, parse_json, parse_timestamp, to_json, Database};

const THREAD_COLUMNS: &str =
    "channel_id, user_id, provider_thread_id, history, created_at, updated_at, expires_at";

fn row_to_thread(row: &Row<'_>) -> Result<Thread, rusqlite::Error> {
    let history: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    let expires_at: String = row.get(6)?;
    Ok(Thread {
        channel_id: row.get(0)?,
        user_id: row.get(1)?,
        provider_thread_id: row.get(2)?,
        conversation_history: parse_json(3, &history)?,
        created_at: parse_timestamp(4, &created_at)?,
        updated_at: parse_timestamp(5, &updated_at)?,
        expires_at: parse_timestamp(6, &expires_at)?,
    })
}

/// The live thread for `(channel_id, user_id)` at `now`.
pub async fn get_thread(
    db: &Database,
    channel_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Thread>, KaiError> {
    let channel_id = channel_id.to_string();
    let user_id = user_id.to_string();
    let now = format_timestamp(&now);
    db.connection()
        .call(move |conn| -> Result<Option<Thread>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads
                 WHERE channel_id = ?1 AND user_id = ?2 AND expires_at > ?3"
            ))?;
            match stmt.query_row(params![channel_id, user_id, now], row_to_thread) {
                Ok(thread) => Ok(Some(thread)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Inserts the pair's thread or refreshes its expiry in one statement.
///
/// A live row keeps its provider thread id and history. An expired row is
/// replaced as if it never existed. Either way the stored row is returned.
pub async fn upsert_thread(
    db: &Database,
    channel_id: &str,
    user_id: &str,
    provider_thread_id: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<Thread, KaiError> {
    let channel_id = channel_id.to_string();
    let user_id = user_id.to_string();
    let provider_thread_id = provider_thread_id.to_string();
    let expires_at = format_timestamp(&(now + ttl));
    let now = format_timestamp(&now);
    db.connection()
        .call(move |conn| -> Result<Thread, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "INSERT INTO threads ({THREAD_COLUMNS})
                 VALUES (?1, ?2, ?3, '[]', ?4, ?4, ?5)
                 ON CONFLICT (channel_id, user_id) DO UPDATE SET
                     provider_thread_id = CASE WHEN threads.expires_at <= excluded.updated_at
                         THEN excluded.provider_thread_id ELSE threads.provider_thread_id END,
                     history = CASE WHEN threads.expires_at <= excluded.updated_at
                         THEN '[]' ELSE threads.history END,
                     created_at = CASE WHEN threads.expires_at <= excluded.updated_at
                         THEN excluded.created_at ELSE threads.created_at END,
                     updated_at = excluded.updated_at,
                     expires_at = excluded.expires_at
                 RETURNING {THREAD_COLUMNS}"
            ))?;
            stmt.query_row(
                params![channel_id, user_id, provider_thread_id, now, expires_at],
                row_to_thread,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Replaces the stored history of the pair's thread.
///
/// Returns `false` when no thread row exists.
pub async fn save_history(
    db: &Database,
    channel_id: &str,
    user_id: &str,
    history: &[ConversationTurn],
    now: DateTime<Utc>,
) -> Result<bool, KaiError> {
    let channel_id = channel_id.to_string();
    let user_id = user_id.to_string();
    let history = history.to_vec();
    let now = format_timestamp(&now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let updated = conn.execute(
                "UPDATE threads SET history = ?1, updated_at = ?2
                 WHERE channel_id = ?3 AND user_id = ?4",
                params![to_json(&history)?, now, channel_id, user_id],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes threads that expired at or before `now`.
pub async fn purge_expired(db: &Database, now: DateTime<Utc>) -> Result<usize, KaiError> {
    let now = format_timestamp(&now);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute("DELETE FROM threads WHERE expires_at <= ?1", params![now])
        })
        .await
        .map_err(map_tr_err)
}
