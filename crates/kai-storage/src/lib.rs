// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Kai backend.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer concurrency
//! model via `tokio-rusqlite`. Stores conversation threads, tasks and events
//! created by tools, and a crash-safe outbox of pending message patches.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use queries::queue::QueueEntry;
