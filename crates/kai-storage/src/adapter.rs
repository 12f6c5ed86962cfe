// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use kai_config::model::StorageConfig;
use kai_core::types::{ConversationTurn, PendingPatch, Thread};
use kai_core::work::{Event, EventQuery, NewEvent, NewTask, Task, TaskQuery};
use kai_core::{
    AdapterType, HealthStatus, KaiError, PatchOutbox, PluginAdapter, StorageAdapter, ThreadStore,
    WorkStore,
};

use crate::database::Database;
use crate::queries;

/// Queue holding message metadata patches that still need applying.
pub const PATCH_QUEUE: &str = "message_patch";

/// Attempts before a patch is given up on.
pub const PATCH_MAX_ATTEMPTS: i32 = 5;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened by
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// The underlying Database, or an error if not initialized.
    pub fn db(&self) -> Result<&Database, KaiError> {
        self.db.get().ok_or_else(|| KaiError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), KaiError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, KaiError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(|e| KaiError::HealthCheckFailed {
                name: "sqlite".to_string(),
                source: Box::new(crate::database::map_tr_err(e)),
            })?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), KaiError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), KaiError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| KaiError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), KaiError> {
        let db = self.db()?;
        self.checkpoint(db).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for SqliteStorage {
    async fn get_thread(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<Thread>, KaiError> {
        queries::threads::get_thread(self.db()?, channel_id, user_id, Utc::now()).await
    }

    async fn upsert_thread(
        &self,
        channel_id: &str,
        user_id: &str,
        provider_thread_id: &str,
        ttl: chrono::Duration,
    ) -> Result<Thread, KaiError> {
        queries::threads::upsert_thread(
            self.db()?,
            channel_id,
            user_id,
            provider_thread_id,
            ttl,
            Utc::now(),
        )
        .await
    }

    async fn save_history(
        &self,
        channel_id: &str,
        user_id: &str,
        history: &[ConversationTurn],
    ) -> Result<(), KaiError> {
        let saved =
            queries::threads::save_history(self.db()?, channel_id, user_id, history, Utc::now())
                .await?;
        if !saved {
            warn!(channel_id, user_id, "history not saved: no thread for pair");
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, KaiError> {
        queries::threads::purge_expired(self.db()?, Utc::now()).await
    }
}

#[async_trait]
impl WorkStore for SqliteStorage {
    async fn create_task(&self, task: &NewTask) -> Result<Task, KaiError> {
        queries::tasks::create_task(self.db()?, task, Utc::now()).await
    }

    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, KaiError> {
        queries::tasks::list_tasks(self.db()?, query).await
    }

    async fn create_event(&self, event: &NewEvent) -> Result<Event, KaiError> {
        queries::events::create_event(self.db()?, event, Utc::now()).await
    }

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>, KaiError> {
        queries::events::list_events(self.db()?, query).await
    }
}

#[async_trait]
impl PatchOutbox for SqliteStorage {
    async fn record_patch(&self, patch: &PendingPatch) -> Result<i64, KaiError> {
        let payload = serde_json::to_string(patch).map_err(|e| KaiError::Storage {
            source: Box::new(e),
        })?;
        queries::queue::enqueue_claimed(self.db()?, PATCH_QUEUE, &payload, PATCH_MAX_ATTEMPTS)
            .await
    }

    async fn complete_patch(&self, id: i64) -> Result<(), KaiError> {
        queries::queue::ack(self.db()?, id).await
    }

    async fn fail_patch(&self, id: i64) -> Result<(), KaiError> {
        queries::queue::fail(self.db()?, id).await
    }

    async fn next_pending_patch(&self) -> Result<Option<(i64, PendingPatch)>, KaiError> {
        let db = self.db()?;
        while let Some(entry) = queries::queue::dequeue(db, PATCH_QUEUE).await? {
            match serde_json::from_str::<PendingPatch>(&entry.payload) {
                Ok(patch) => return Ok(Some((entry.id, patch))),
                Err(e) => {
                    warn!(id = entry.id, error = %e, "discarding undecodable patch");
                    queries::queue::discard(db, entry.id).await?;
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_core::types::{MessageId, MessageMetadata, MessageUpdate};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    async fn initialized() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("kai.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        (storage, dir)
    }

    fn patch(id: &str) -> PendingPatch {
        PendingPatch {
            message_id: MessageId(id.to_string()),
            update: MessageUpdate {
                text: None,
                extra: MessageMetadata::default(),
            },
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let (storage, _dir) = initialized().await;
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn health_check_reflects_initialization() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        assert!(storage.health_check().await.is_err());

        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn thread_lifecycle_through_adapter() {
        let (storage, _dir) = initialized().await;
        assert!(storage.get_thread("c1", "u1").await.unwrap().is_none());

        let thread = storage
            .upsert_thread("c1", "u1", "thread_1", chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(thread.provider_thread_id, "thread_1");

        let history = [ConversationTurn::user("hello")];
        storage.save_history("c1", "u1", &history).await.unwrap();
        let loaded = storage.get_thread("c1", "u1").await.unwrap().unwrap();
        assert_eq!(loaded.conversation_history, history);

        assert_eq!(storage.purge_expired().await.unwrap(), 0);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn recorded_patch_is_only_replayed_after_failure() {
        let (storage, _dir) = initialized().await;

        let id = storage.record_patch(&patch("m1")).await.unwrap();
        assert!(storage.next_pending_patch().await.unwrap().is_none());

        storage.fail_patch(id).await.unwrap();
        let (replay_id, replayed) = storage.next_pending_patch().await.unwrap().unwrap();
        assert_eq!(replay_id, id);
        assert_eq!(replayed, patch("m1"));

        storage.complete_patch(id).await.unwrap();
        assert!(storage.next_pending_patch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undecodable_patch_is_discarded() {
        let (storage, _dir) = initialized().await;
        let db = storage.db().unwrap();
        queries::queue::enqueue(db, PATCH_QUEUE, "not json", PATCH_MAX_ATTEMPTS)
            .await
            .unwrap();
        let id = storage.record_patch(&patch("m2")).await.unwrap();
        storage.fail_patch(id).await.unwrap();

        let (next_id, _) = storage.next_pending_patch().await.unwrap().unwrap();
        assert_eq!(next_id, id);
    }

    #[tokio::test]
    async fn shutdown_runs_checkpoint() {
        let (storage, _dir) = initialized().await;
        storage
            .create_task(&NewTask {
                title: "ship".to_string(),
                description: None,
                priority: Default::default(),
                completion_date: Utc::now(),
                assignees: vec![],
                subtasks: vec![],
                creator_id: "u1".to_string(),
                channel_id: "c1".to_string(),
            })
            .await
            .unwrap();
        storage.shutdown().await.unwrap();
    }
}
