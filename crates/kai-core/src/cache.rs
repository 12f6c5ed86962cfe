// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Injected key-value cache with per-entry expiry.
//!
//! Replaces process-global maps: every cache is constructed explicitly with a
//! TTL and handed to the components that need it. Entries expire `ttl` after
//! their last `set`; an expired entry is never returned and is removed on the
//! read that finds it or by [`TtlCache::purge_expired`].

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Minimal cache interface shared by the agent and the tools.
pub trait CacheService<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: &str, value: V);
    fn evict(&self, key: &str);
}

/// A concurrent TTL cache. Expiry is measured on the tokio clock.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: DashMap<String, (Instant, V)>,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (expires_at, _)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

impl<V: Clone + Send + Sync> CacheService<V> for TtlCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.0 > now => return Some(entry.1.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(key, |_, (expires_at, _)| *expires_at <= now);
        }
        None
    }

    fn set(&self, key: &str, value: V) {
        self.entries
            .insert(key.to_string(), (Instant::now() + self.ttl, value));
    }

    fn evict(&self, key: &str) {
        self.entries.remove(key);
    }
}
