// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete agent stack with mock adapters, a
//! temp SQLite database and the built-in tools. Provides `send()` and
//! `send_request()` to drive the full message pipeline in tests.

use std::sync::Arc;
use std::time::Duration;

use kai_agent::{Agent, AgentCaches, AgentDeps, AgentRequest, Outcome};
use kai_config::model::{KaiConfig, StorageConfig};
use kai_core::types::ChatUser;
use kai_core::{KaiError, StorageAdapter, TtlCache};
use kai_skill::{ToolDeps, ToolRegistry, register_builtins};
use kai_storage::SqliteStorage;

use crate::mock_provider::MockProvider;
use crate::mock_transport::{MockNotifier, MockTransport};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    provider: MockProvider,
    config: KaiConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            provider: MockProvider::new(),
            config: KaiConfig::default(),
        }
    }

    /// Uses a scripted provider.
    pub fn with_provider(mut self, provider: MockProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Adjusts the configuration before the agent is built.
    pub fn with_config(mut self, configure: impl FnOnce(&mut KaiConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, KaiError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| KaiError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().into_owned(),
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let provider = Arc::new(self.provider);
        let transport = MockTransport::new();
        let notifier = MockNotifier::new();
        let user_cache: Arc<TtlCache<ChatUser>> = Arc::new(TtlCache::new(Duration::from_secs(
            config.cache.user_mapping_ttl_secs,
        )));

        let mut registry = ToolRegistry::new();
        register_builtins(
            &mut registry,
            &ToolDeps {
                work: storage.clone(),
                transport: Arc::new(transport.clone()),
                notifier: Arc::new(notifier.clone()),
                user_cache,
            },
        );

        let caches = AgentCaches::from_config(&config.cache);
        let agent = Agent::new(
            &config,
            AgentDeps {
                provider: provider.clone(),
                transport: Arc::new(transport.clone()),
                threads: storage.clone(),
                work: storage.clone(),
                outbox: storage.clone(),
                tools: Arc::new(registry),
                caches: caches.clone(),
            },
        )?;

        Ok(TestHarness {
            agent: Arc::new(agent),
            provider,
            transport,
            notifier,
            storage,
            caches,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete agent stack over mocks and a temp database.
pub struct TestHarness {
    pub agent: Arc<Agent>,
    pub provider: Arc<MockProvider>,
    pub transport: MockTransport,
    pub notifier: MockNotifier,
    pub storage: Arc<SqliteStorage>,
    pub caches: AgentCaches,
    pub config: KaiConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The Kai channel of `user_id` under the configured prefix.
    pub fn kai_channel(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.config.agent.kai_channel_prefix)
    }

    /// Sends `text` from `user_id` in `channel_id` with default options.
    pub async fn send(&self, channel_id: &str, user_id: &str, text: &str) -> Outcome {
        self.send_request(AgentRequest {
            text: text.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn send_request(&self, request: AgentRequest) -> Outcome {
        self.agent.handle_message(request).await
    }
}
