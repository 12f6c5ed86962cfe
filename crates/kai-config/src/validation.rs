// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Covers constraints serde cannot express: numeric ranges, non-empty paths,
//! and settings that only make sense together.

use crate::diagnostic::ConfigError;
use crate::model::{KaiConfig, ProviderKind};

/// Upper bound on tool-use rounds for a single message.
pub const MAX_TOOL_ROUNDS_LIMIT: usize = 10;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem instead of failing on the first one.
pub fn validate_config(config: &KaiConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    let agent = &config.agent;
    if !(1..=MAX_TOOL_ROUNDS_LIMIT).contains(&agent.max_tool_rounds) {
        invalid(format!(
            "agent.max_tool_rounds must be between 1 and {MAX_TOOL_ROUNDS_LIMIT}, got {}",
            agent.max_tool_rounds
        ));
    }
    if agent.history_window < 2 {
        invalid(format!(
            "agent.history_window must be at least 2, got {}",
            agent.history_window
        ));
    }
    if agent.history_max_chars < 100 {
        invalid(format!(
            "agent.history_max_chars must be at least 100, got {}",
            agent.history_max_chars
        ));
    }
    if agent.summary_lookback_days < 1 {
        invalid(format!(
            "agent.summary_lookback_days must be at least 1, got {}",
            agent.summary_lookback_days
        ));
    }
    if agent.bot_user_id.trim().is_empty() {
        invalid("agent.bot_user_id must not be empty".to_string());
    }
    if agent.kai_channel_prefix.is_empty() {
        invalid("agent.kai_channel_prefix must not be empty".to_string());
    }

    if config.threads.ttl_days < 1 {
        invalid(format!(
            "threads.ttl_days must be at least 1, got {}",
            config.threads.ttl_days
        ));
    }
    if config.threads.purge_interval_secs == 0 {
        invalid("threads.purge_interval_secs must be greater than 0".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    if config.chat.base_url.trim().is_empty() {
        invalid("chat.base_url must not be empty".to_string());
    }
    if config.chat.timeout_secs == 0 {
        invalid("chat.timeout_secs must be greater than 0".to_string());
    }

    let gateway = &config.gateway;
    if gateway.enabled {
        if gateway.host.trim().is_empty() {
            invalid("gateway.host must not be empty".to_string());
        }
        let has_auth = gateway
            .bearer_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
            || gateway
                .webhook_secret
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty());
        if !has_auth {
            invalid(
                "gateway.enabled requires gateway.bearer_token or gateway.webhook_secret"
                    .to_string(),
            );
        }
    }

    if config.provider.kind == ProviderKind::OpenAi
        && config
            .openai
            .assistant_id
            .as_deref()
            .is_none_or(|id| id.trim().is_empty())
    {
        invalid("provider.kind = \"openai\" requires openai.assistant_id".to_string());
    }

    let prompts = &config.prompts;
    for (key, path) in [
        ("prompts.kai_prompt_file", &prompts.kai_prompt_file),
        ("prompts.detector_prompt_file", &prompts.detector_prompt_file),
    ] {
        if let Some(path) = path
            && path.trim().is_empty()
        {
            invalid(format!("{key} must not be empty when set"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> KaiConfig {
        let mut config = KaiConfig::default();
        config.gateway.bearer_token = Some("secret".to_string());
        config
    }

    fn messages(result: Result<(), Vec<ConfigError>>) -> Vec<String> {
        result
            .unwrap_err()
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn config_with_gateway_token_is_valid() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn gateway_without_auth_is_rejected() {
        let config = KaiConfig::default();
        let msgs = messages(validate_config(&config));
        assert!(msgs.iter().any(|m| m.contains("gateway.bearer_token")));
    }

    #[test]
    fn disabled_gateway_needs_no_auth() {
        let mut config = KaiConfig::default();
        config.gateway.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn webhook_secret_alone_satisfies_auth() {
        let mut config = KaiConfig::default();
        config.gateway.webhook_secret = Some("hmac-key".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn tool_rounds_outside_range_rejected() {
        let mut config = valid_config();
        config.agent.max_tool_rounds = 0;
        assert!(messages(validate_config(&config))[0].contains("max_tool_rounds"));

        config.agent.max_tool_rounds = 11;
        assert!(messages(validate_config(&config))[0].contains("max_tool_rounds"));

        config.agent.max_tool_rounds = 10;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = valid_config();
        config.agent.history_window = 1;
        config.agent.history_max_chars = 10;
        config.threads.ttl_days = 0;
        config.storage.database_path = "  ".to_string();
        assert_eq!(validate_config(&config).unwrap_err().len(), 4);
    }

    #[test]
    fn openai_requires_assistant_id() {
        let mut config = valid_config();
        config.provider.kind = ProviderKind::OpenAi;
        let msgs = messages(validate_config(&config));
        assert!(msgs[0].contains("openai.assistant_id"));

        config.openai.assistant_id = Some("asst_123".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_prompt_file_rejected() {
        let mut config = valid_config();
        config.prompts.kai_prompt_file = Some(String::new());
        let msgs = messages(validate_config(&config));
        assert!(msgs[0].contains("prompts.kai_prompt_file"));
    }
}
