// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./kai.toml` > `~/.config/kai/kai.toml` > `/etc/kai/kai.toml`,
//! with environment variable overrides via the `KAI_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KaiConfig;

/// Top-level sections, used to map `KAI_<SECTION>_<KEY>` to `section.key`.
const SECTIONS: &[&str] = &[
    "agent", "prompts", "provider", "anthropic", "openai", "storage", "chat", "gateway",
    "cache", "threads",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/kai/kai.toml`
/// 3. `~/.config/kai/kai.toml`
/// 4. `./kai.toml`
/// 5. `KAI_*` environment variables
pub fn load_config() -> Result<KaiConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<KaiConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KaiConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KaiConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KaiConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KaiConfig::default()))
        .merge(Toml::file("/etc/kai/kai.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("kai/kai.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("kai.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `KAI_CHAT_BASE_URL` to `chat.base_url`.
///
/// Only the first underscore after a known section name becomes a dot, so key
/// names containing underscores survive intact.
fn env_provider() -> Env {
    Env::prefixed("KAI_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section)
            && let Some(field) = rest.strip_prefix('_')
        {
            return format!("{section}.{field}");
        }
    }
    key.to_string()
}
