// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits: threads, tasks and events, and the metadata-patch outbox.

use async_trait::async_trait;

use crate::error::KaiError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConversationTurn, PendingPatch, Thread};
use crate::work::{Event, EventQuery, NewEvent, NewTask, Task, TaskQuery};

/// One thread per (channel, user), expiring after a period of inactivity.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// The live (unexpired) thread for the pair, if any.
    async fn get_thread(&self, channel_id: &str, user_id: &str)
    -> Result<Option<Thread>, KaiError>;

    /// Atomically creates the pair's thread or refreshes its expiry.
    ///
    /// `provider_thread_id` is only used when no live thread exists, so
    /// concurrent first contacts converge on the same row. The returned
    /// thread is the one that won.
    async fn upsert_thread(
        &self,
        channel_id: &str,
        user_id: &str,
        provider_thread_id: &str,
        ttl: chrono::Duration,
    ) -> Result<Thread, KaiError>;

    /// Replaces the stored conversation history.
    async fn save_history(
        &self,
        channel_id: &str,
        user_id: &str,
        history: &[ConversationTurn],
    ) -> Result<(), KaiError>;

    /// Deletes expired threads and returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, KaiError>;
}

/// Task and event persistence used by the tools.
#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<Task, KaiError>;
    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, KaiError>;
    async fn create_event(&self, event: &NewEvent) -> Result<Event, KaiError>;
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>, KaiError>;
}

/// Durable record of metadata patches not yet applied to the transport.
#[async_trait]
pub trait PatchOutbox: Send + Sync {
    /// Records a patch before it is attempted. Returns the entry id.
    async fn record_patch(&self, patch: &PendingPatch) -> Result<i64, KaiError>;

    /// Marks a patch as applied.
    async fn complete_patch(&self, id: i64) -> Result<(), KaiError>;

    /// Records a failed attempt; the patch is retried until its attempts run out.
    async fn fail_patch(&self, id: i64) -> Result<(), KaiError>;

    /// Claims the oldest pending patch.
    async fn next_pending_patch(&self) -> Result<Option<(i64, PendingPatch)>, KaiError>;
}

/// A full storage backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter + ThreadStore + WorkStore + PatchOutbox {
    /// Initializes the storage backend (migrations, connection setup).
    async fn initialize(&self) -> Result<(), KaiError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), KaiError>;
}
