// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Kai chat assistant backend.
//!
//! Foundational trait definitions, error types, and common types shared by
//! every crate in the workspace. Provider, transport and storage adapters
//! implement the traits defined here.

pub mod cache;
pub mod error;
pub mod traits;
pub mod types;
pub mod work;

pub use cache::{CacheService, TtlCache};
pub use error::KaiError;
pub use types::{AdapterType, HealthStatus, MessageId};

pub use traits::{
    ChatTransport, EventStream, Notifier, PatchOutbox, PluginAdapter, ProviderAdapter,
    StorageAdapter, ThreadStore, WorkStore,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kai_error_messages() {
        let err = KaiError::ToolLoopExceeded { max_rounds: 8 };
        assert_eq!(err.to_string(), "tool-use loop exceeded after 8 rounds");

        let err = KaiError::Tool {
            tool: "create_task".into(),
            message: "title is required".into(),
        };
        assert_eq!(err.to_string(), "tool `create_task` failed: title is required");

        assert_eq!(
            KaiError::provider("overloaded").to_string(),
            "provider error: overloaded"
        );
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Provider,
            AdapterType::Transport,
            AdapterType::Storage,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _provider(_: &dyn ProviderAdapter) {}
        fn _transport(_: &dyn ChatTransport) {}
        fn _storage(_: &dyn StorageAdapter) {}
        fn _threads(_: &dyn ThreadStore) {}
        fn _work(_: &dyn WorkStore) {}
        fn _outbox(_: &dyn PatchOutbox) {}
        fn _notifier(_: &dyn Notifier) {}
    }
}
