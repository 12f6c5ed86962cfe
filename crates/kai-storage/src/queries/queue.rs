// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe deferred work.
//!
//! Entries move `pending -> processing -> completed`. A processing entry whose
//! lock expired (its worker crashed) is claimable again. `fail` returns an
//! entry to `pending` until its attempts run out.

use kai_core::KaiError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// A row of the `queue` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// Enqueue a new pending item. Returns the queue entry ID.
#[cfg(test)]
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
    max_attempts: i32,
) -> Result<i64, KaiError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO queue (queue_name, payload, max_attempts) VALUES (?1, ?2, ?3)",
                params![queue_name, payload, max_attempts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Enqueue an item already claimed by the caller.
///
/// The entry starts as `processing` with a 5-minute lock, so no other worker
/// picks it up while the caller attempts it. If the caller dies, the lock
/// expires and the entry becomes claimable.
pub async fn enqueue_claimed(
    db: &Database,
    queue_name: &str,
    payload: &str,
    max_attempts: i32,
) -> Result<i64, KaiError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO queue (queue_name, payload, max_attempts, status, locked_until)
                 VALUES (?1, ?2, ?3, 'processing',
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'))",
                params![queue_name, payload, max_attempts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Dequeue the next claimable entry from the named queue.
///
/// Atomically selects the oldest pending (or lock-expired) entry and marks it
/// as "processing" with a 5-minute lock. Returns `None` if nothing is claimable.
pub async fn dequeue(db: &Database, queue_name: &str) -> Result<Option<QueueEntry>, KaiError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<QueueEntry>, rusqlite::Error> {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(
                    "SELECT id, queue_name, payload, status, attempts, max_attempts,
                            created_at, updated_at, locked_until
                     FROM queue
                     WHERE queue_name = ?1
                       AND (status = 'pending'
                            OR (status = 'processing'
                                AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
                     ORDER BY id ASC
                     LIMIT 1",
                )?;
                stmt.query_row(params![queue_name], |row| {
                    Ok(QueueEntry {
                        id: row.get(0)?,
                        queue_name: row.get(1)?,
                        payload: row.get(2)?,
                        status: row.get(3)?,
                        attempts: row.get(4)?,
                        max_attempts: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                        locked_until: row.get(8)?,
                    })
                })
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE queue SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;

                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Marks the entry as "completed".
pub async fn ack(db: &Database, id: i64) -> Result<(), KaiError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Records a failed attempt.
///
/// Increments attempts. If attempts >= max_attempts, sets status to "failed".
/// Otherwise resets to "pending" for retry and clears the lock.
pub async fn fail(db: &Database, id: i64) -> Result<(), KaiError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let (attempts, max_attempts): (i32, i32) = conn.query_row(
                "SELECT attempts, max_attempts FROM queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            let status = if new_attempts >= max_attempts {
                "failed"
            } else {
                "pending"
            };
            conn.execute(
                "UPDATE queue SET status = ?1, attempts = ?2,
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![status, new_attempts, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Permanently fails an entry regardless of remaining attempts.
pub async fn discard(db: &Database, id: i64) -> Result<(), KaiError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE queue SET status = 'failed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn status_of(db: &Database, id: i64) -> (String, i32) {
        db.connection()
            .call(move |conn| -> Result<(String, i32), rusqlite::Error> {
                conn.query_row(
                    "SELECT status, attempts FROM queue WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn enqueue_and_dequeue_lifecycle() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "message_patch", r#"{"m":"1"}"#, 5).await.unwrap();
        assert!(id > 0);

        let entry = dequeue(&db, "message_patch").await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, "processing");
        assert_eq!(entry.max_attempts, 5);
        assert_eq!(entry.payload, r#"{"m":"1"}"#);

        assert!(dequeue(&db, "message_patch").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claimed_entry_is_not_dequeued_until_failed() {
        let (db, _dir) = setup_db().await;

        let id = enqueue_claimed(&db, "message_patch", "{}", 5).await.unwrap();
        assert!(dequeue(&db, "message_patch").await.unwrap().is_none());

        fail(&db, id).await.unwrap();
        assert_eq!(status_of(&db, id).await, ("pending".to_string(), 1));
        let entry = dequeue(&db, "message_patch").await.unwrap().unwrap();
        assert_eq!(entry.id, id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimable() {
        let (db, _dir) = setup_db().await;
        let id = enqueue_claimed(&db, "message_patch", "{}", 5).await.unwrap();
        db.connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE queue SET locked_until = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let entry = dequeue(&db, "message_patch").await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ack_marks_completed() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "test", "payload", 3).await.unwrap();
        dequeue(&db, "test").await.unwrap().unwrap();
        ack(&db, id).await.unwrap();
        assert_eq!(status_of(&db, id).await.0, "completed");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_marks_permanently_failed_at_max_attempts() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "test", "payload", 3).await.unwrap();

        for _ in 0..3 {
            dequeue(&db, "test").await.unwrap().unwrap();
            fail(&db, id).await.unwrap();
        }

        assert_eq!(status_of(&db, id).await, ("failed".to_string(), 3));
        assert!(dequeue(&db, "test").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn discard_skips_remaining_attempts() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "test", "garbage", 5).await.unwrap();
        discard(&db, id).await.unwrap();
        assert_eq!(status_of(&db, id).await.0, "failed");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn queues_are_isolated_by_name() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, "a", "1", 3).await.unwrap();
        assert!(dequeue(&db, "b").await.unwrap().is_none());
        assert!(dequeue(&db, "a").await.unwrap().is_some());
        db.close().await.unwrap();
    }
}
