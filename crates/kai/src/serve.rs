// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kai serve` command implementation.
//!
//! Opens SQLite storage, builds the configured provider, the chat transport
//! and the built-in tools, replays the patch outbox and then serves the
//! webhook gateway until SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use kai_agent::{Agent, AgentCaches, AgentDeps, shutdown};
use kai_chat::HttpChatTransport;
use kai_config::model::{KaiConfig, ProviderKind};
use kai_core::types::ChatUser;
use kai_core::{KaiError, ProviderAdapter, StorageAdapter, ThreadStore, TtlCache};
use kai_gateway::{AuthConfig, GatewayState, ServerConfig};
use kai_skill::{ToolDeps, ToolRegistry, register_builtins};
use kai_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Workspace crates whose log level follows `agent.log_level`.
const KAI_CRATES: &[&str] = &[
    "kai",
    "kai_agent",
    "kai_anthropic",
    "kai_chat",
    "kai_config",
    "kai_core",
    "kai_gateway",
    "kai_openai",
    "kai_skill",
    "kai_storage",
];

/// How long shutdown waits for in-flight messages.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `kai serve` command.
pub async fn run_serve(config: KaiConfig) -> Result<(), KaiError> {
    init_tracing(&config.agent.log_level);

    info!(agent_name = config.agent.name.as_str(), "starting kai serve");

    let storage = open_storage(&config).await?;

    let transport = Arc::new(HttpChatTransport::new(&config.chat)?);
    let provider = build_provider(&config).map_err(|e| {
        error!(provider = %config.provider.kind, error = %e, "failed to initialize provider");
        e
    })?;

    let user_cache: Arc<TtlCache<ChatUser>> = Arc::new(TtlCache::new(Duration::from_secs(
        config.cache.user_mapping_ttl_secs,
    )));
    let mut tool_registry = ToolRegistry::new();
    register_builtins(
        &mut tool_registry,
        &ToolDeps {
            work: storage.clone(),
            transport: transport.clone(),
            notifier: transport.clone(),
            user_cache: user_cache.clone(),
        },
    );
    info!("tool registry initialized with {} built-in tools", tool_registry.len());

    let agent = Arc::new(Agent::new(
        &config,
        AgentDeps {
            provider,
            transport,
            threads: storage.clone(),
            work: storage.clone(),
            outbox: storage.clone(),
            tools: Arc::new(tool_registry),
            caches: AgentCaches::from_config(&config.cache),
        },
    )?);

    // Patches left over from a crash are applied before new traffic.
    match agent.replay_outbox().await {
        Ok(applied) => info!(applied, "outbox replay complete"),
        Err(e) => warn!(error = %e, "outbox replay failed, continuing"),
    }

    let cancel = shutdown::install_signal_handler();

    {
        let storage = storage.clone();
        let user_cache = user_cache.clone();
        let interval = Duration::from_secs(config.threads.purge_interval_secs);
        let purge_cancel = cancel.clone();
        tokio::spawn(async move {
            purge_loop(storage, user_cache, interval, purge_cancel).await;
        });
        info!(
            interval_secs = config.threads.purge_interval_secs,
            ttl_days = config.threads.ttl_days,
            "thread purge task started"
        );
    }

    if config.gateway.enabled {
        let server_config = ServerConfig {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
            drain_timeout: DRAIN_TIMEOUT,
        };
        let auth = AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
            webhook_secret: config.gateway.webhook_secret.clone(),
        };
        if !auth.is_configured() {
            warn!("gateway has no bearer_token or webhook_secret; every request will be rejected");
        }
        let state = GatewayState::new(agent.clone(), auth);
        if let Err(e) = kai_gateway::start_server(&server_config, state, cancel.clone()).await {
            error!(error = %e, "gateway server failed");
            cancel.cancel();
        }
    } else {
        warn!("gateway disabled; waiting for shutdown signal");
        cancel.cancelled().await;
    }

    let remaining = shutdown::drain_handlers(agent.stops(), DRAIN_TIMEOUT).await;
    if remaining > 0 {
        warn!(remaining, "handlers cancelled at shutdown");
    }
    agent.dispose();

    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }

    info!("kai serve shutdown complete");
    Ok(())
}

/// Runs `kai threads purge`: deletes expired threads once.
pub async fn purge_threads(config: &KaiConfig) -> Result<usize, KaiError> {
    let storage = open_storage(config).await?;
    let removed = storage.purge_expired().await;
    storage.close().await?;
    removed
}

async fn open_storage(config: &KaiConfig) -> Result<Arc<SqliteStorage>, KaiError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// Builds the provider named by `provider.kind`.
fn build_provider(config: &KaiConfig) -> Result<Arc<dyn ProviderAdapter>, KaiError> {
    match config.provider.kind {
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Ok(Arc::new(kai_anthropic::AnthropicProvider::new(config)?)),
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => Ok(Arc::new(kai_openai::OpenAiProvider::new(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(KaiError::Config(format!(
            "provider `{other}` is not compiled into this binary"
        ))),
    }
}

/// Purges expired threads and user-mapping entries every `interval`.
async fn purge_loop(
    storage: Arc<SqliteStorage>,
    user_cache: Arc<TtlCache<ChatUser>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match storage.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "expired threads purged"),
                    Err(e) => warn!(error = %e, "thread purge failed (non-fatal)"),
                }
                let evicted = user_cache.purge_expired();
                if evicted > 0 {
                    debug!(evicted, "user mapping cache purged");
                }
            }
            _ = cancel.cancelled() => {
                info!("thread purge task shutting down");
                break;
            }
        }
    }
}

/// Initializes the tracing subscriber with the configured log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives: Vec<String> = KAI_CRATES
            .iter()
            .map(|target| format!("{target}={log_level}"))
            .collect();
        directives.push("warn".to_string());
        EnvFilter::new(directives.join(","))
    });

    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &tempfile::TempDir) -> KaiConfig {
        let mut config = KaiConfig::default();
        config.storage.database_path = dir.path().join("kai.db").to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn purge_threads_on_fresh_database_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        assert_eq!(purge_threads(&config).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_threads_removes_expired_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        {
            let storage = open_storage(&config).await.unwrap();
            storage
                .upsert_thread("kai-u1", "u1", "t-old", chrono::Duration::days(-1))
                .await
                .unwrap();
            storage
                .upsert_thread("kai-u2", "u2", "t-live", chrono::Duration::days(30))
                .await
                .unwrap();
            storage.close().await.unwrap();
        }
        assert_eq!(purge_threads(&config).await.unwrap(), 1);
    }

    #[test]
    #[serial_test::serial]
    fn missing_anthropic_key_fails_provider_build() {
        let mut config = KaiConfig::default();
        config.provider.kind = ProviderKind::Anthropic;
        config.anthropic.api_key = None;
        // SAFETY: test runs serially; nothing else reads the environment.
        unsafe { std::env::remove_var("ANTHROPIC_API_KEY") };
        let err = build_provider(&config).err().unwrap();
        assert!(err.to_string().to_lowercase().contains("api key"));
    }
}
