// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, migrations, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use kai_core::KaiError;
use tracing::debug;

/// Timestamp layout stored in every TEXT date column. Sorts lexically.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Handle to the single SQLite writer connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (or creates) the database at `path`, applies pragmas, and runs
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, KaiError> {
        Self::open_with(path, true).await
    }

    /// Like [`Database::open`] with explicit control over WAL mode.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, KaiError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| KaiError::Storage {
                source: Box::new(e),
            })?;
        }

        // Migrations need a plain connection; run them off the async runtime.
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), KaiError> {
            let mut conn = rusqlite::Connection::open(&migrate_path).map_err(|e| {
                KaiError::Storage {
                    source: Box::new(e),
                }
            })?;
            crate::migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| KaiError::Internal(format!("migration task panicked: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| KaiError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying async connection. Query modules go through this.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(self) -> Result<(), KaiError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Converts tokio-rusqlite errors into [`KaiError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KaiError {
    KaiError::Storage {
        source: Box::new(e),
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp, reporting failures against column `idx`.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Decodes a JSON TEXT column, reporting failures against column `idx`.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Encodes a value for a JSON TEXT column.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("kai.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        for table in ["events", "queue", "tasks", "threads"] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("kai.db");
        let path = db_path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
    }

    #[test]
    fn timestamps_round_trip_at_millisecond_precision() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let formatted = format_timestamp(&ts);
        assert_eq!(formatted, "2026-03-04T05:06:07.000Z");
        assert_eq!(parse_timestamp(0, &formatted).unwrap(), ts);
        assert!(parse_timestamp(0, "yesterday").is_err());
    }
}
