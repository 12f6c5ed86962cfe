// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! External collaborators (LLM providers, the chat transport, persistence and
//! notification delivery) sit behind these traits and use `#[async_trait]` for
//! dynamic dispatch.

pub mod adapter;
pub mod notifier;
pub mod provider;
pub mod storage;
pub mod transport;

pub use adapter::PluginAdapter;
pub use notifier::Notifier;
pub use provider::{EventStream, ProviderAdapter};
pub use storage::{PatchOutbox, StorageAdapter, ThreadStore, WorkStore};
pub use transport::ChatTransport;
