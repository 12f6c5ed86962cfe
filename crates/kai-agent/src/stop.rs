// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stop-generating registry.
//!
//! Every live response handler registers a [`CancellationToken`] under its
//! channel id. A stop event cancels all tokens of that channel. The returned
//! [`StopGuard`] removes the registration when the handler finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    channels: DashMap<String, Vec<(u64, CancellationToken)>>,
}

/// Live handlers keyed by channel id. Cheap to clone.
#[derive(Clone, Default)]
pub struct StopRegistry {
    inner: Arc<Inner>,
}

impl StopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `channel_id`.
    pub fn register(&self, channel_id: &str) -> StopGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.inner
            .channels
            .entry(channel_id.to_string())
            .or_default()
            .push((id, token.clone()));
        StopGuard {
            registry: self.clone(),
            channel_id: channel_id.to_string(),
            id,
            token,
        }
    }

    /// Cancels every live handler of `channel_id`. Returns how many there were.
    pub fn stop(&self, channel_id: &str) -> usize {
        let Some(entry) = self.inner.channels.get(channel_id) else {
            return 0;
        };
        for (_, token) in entry.iter() {
            token.cancel();
        }
        debug!(channel_id, count = entry.len(), "stop-generating signalled");
        entry.len()
    }

    /// Cancels every live handler.
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for entry in self.inner.channels.iter() {
            for (_, token) in entry.value() {
                token.cancel();
                count += 1;
            }
        }
        count
    }

    /// Number of live handlers.
    pub fn live(&self) -> usize {
        self.inner.channels.iter().map(|e| e.value().len()).sum()
    }

    fn deregister(&self, channel_id: &str, id: u64) {
        self.inner.channels.remove_if_mut(channel_id, |_, handlers| {
            handlers.retain(|(h, _)| *h != id);
            handlers.is_empty()
        });
    }
}

/// Registration of one handler. Deregisters on drop.
pub struct StopGuard {
    registry: StopRegistry,
    channel_id: String,
    id: u64,
    token: CancellationToken,
}

impl StopGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.channel_id, self.id);
    }
}
