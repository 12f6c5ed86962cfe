// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level Kai configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KaiConfig {
    /// Assistant identity and message-handling behavior.
    #[serde(default)]
    pub agent: AgentConfig,

    /// System prompt overrides per assistant profile.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Which LLM provider serves requests.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Anthropic API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// OpenAI Assistants API settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat transport REST settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Webhook gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// TTLs of the injected caches.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Thread expiry settings.
    #[serde(default)]
    pub threads: ThreadsConfig,
}

/// Assistant identity and message-handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Chat user id the assistant posts as. Its own messages are ignored.
    #[serde(default = "default_bot_user_id")]
    pub bot_user_id: String,

    /// Channels whose id starts with this prefix are Kai conversations.
    #[serde(default = "default_kai_channel_prefix")]
    pub kai_channel_prefix: String,

    /// Maximum number of tool-use rounds per message.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Number of most recent turns kept in thread history.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Maximum characters stored per history turn.
    #[serde(default = "default_history_max_chars")]
    pub history_max_chars: usize,

    /// How far back the daily summary looks, in days.
    #[serde(default = "default_summary_lookback_days")]
    pub summary_lookback_days: i64,

    /// Message sent when handling fails. `None` keeps the failure silent.
    #[serde(default)]
    pub fallback_message: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            bot_user_id: default_bot_user_id(),
            kai_channel_prefix: default_kai_channel_prefix(),
            max_tool_rounds: default_max_tool_rounds(),
            history_window: default_history_window(),
            history_max_chars: default_history_max_chars(),
            summary_lookback_days: default_summary_lookback_days(),
            fallback_message: None,
        }
    }
}

fn default_agent_name() -> String {
    "kai".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bot_user_id() -> String {
    "kai".to_string()
}

fn default_kai_channel_prefix() -> String {
    "kai-".to_string()
}

fn default_max_tool_rounds() -> usize {
    8
}

fn default_history_window() -> usize {
    20
}

fn default_history_max_chars() -> usize {
    2000
}

fn default_summary_lookback_days() -> i64 {
    2
}

/// System prompt overrides. A file takes precedence over the inline string.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromptsConfig {
    #[serde(default)]
    pub kai_prompt: Option<String>,

    #[serde(default)]
    pub kai_prompt_file: Option<String>,

    #[serde(default)]
    pub detector_prompt: Option<String>,

    #[serde(default)]
    pub detector_prompt_file: Option<String>,
}

/// Supported LLM backends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    OpenAi,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for every request.
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
        }
    }
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

/// OpenAI Assistants API configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// OpenAI API key. `None` falls back to `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Assistant that runs every thread.
    #[serde(default)]
    pub assistant_id: Option<String>,

    /// Overrides the assistant's configured model.
    #[serde(default)]
    pub model: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("kai").join("kai.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("kai.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Chat transport REST API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Base URL of the chat service API.
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,

    /// Server-side API key for the chat service.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            api_key: None,
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_base_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_chat_timeout_secs() -> u64 {
    30
}

/// Webhook gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Static bearer token accepted on inbound requests.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Shared secret for `X-Signature` HMAC verification of webhook bodies.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
            webhook_secret: None,
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

/// TTLs of the injected caches, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Daily-summary context per user.
    #[serde(default = "default_user_context_ttl_secs")]
    pub user_context_ttl_secs: u64,

    /// Conversation history per thread.
    #[serde(default = "default_history_ttl_secs")]
    pub history_ttl_secs: u64,

    /// Username to chat-user mapping.
    #[serde(default = "default_user_mapping_ttl_secs")]
    pub user_mapping_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_context_ttl_secs: default_user_context_ttl_secs(),
            history_ttl_secs: default_history_ttl_secs(),
            user_mapping_ttl_secs: default_user_mapping_ttl_secs(),
        }
    }
}

fn default_user_context_ttl_secs() -> u64 {
    300
}

fn default_history_ttl_secs() -> u64 {
    600
}

fn default_user_mapping_ttl_secs() -> u64 {
    3600
}

/// Thread expiry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadsConfig {
    /// Days of inactivity after which a thread expires.
    #[serde(default = "default_thread_ttl_days")]
    pub ttl_days: i64,

    /// How often `serve` purges expired threads.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_thread_ttl_days(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_thread_ttl_days() -> i64 {
    7
}

fn default_purge_interval_secs() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = KaiConfig::default();
        assert_eq!(config.agent.max_tool_rounds, 8);
        assert_eq!(config.agent.history_window, 20);
        assert_eq!(config.agent.history_max_chars, 2000);
        assert_eq!(config.threads.ttl_days, 7);
        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert!(config.agent.fallback_message.is_none());
    }

    #[test]
    fn provider_kind_parses_lowercase() {
        let config: KaiConfig = toml::from_str("[provider]\nkind = \"openai\"\n").unwrap();
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
    }
}
