// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Kai backend.
//!
//! TOML configuration with strict key checking (`deny_unknown_fields`), XDG
//! file lookup, `KAI_*` environment overrides, and miette diagnostics with
//! typo suggestions.
//!
//! ```no_run
//! use kai_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("assistant: {}", config.agent.name);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::KaiConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// Figment errors are converted into diagnostics with source spans; semantic
/// problems are collected by [`validation::validate_config`].
pub fn load_and_validate() -> Result<KaiConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let toml_sources = collect_toml_sources();
            Err(diagnostic::figment_to_config_errors(err, &toml_sources))
        }
    }
}

/// Load configuration from an explicit file and validate it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<KaiConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<KaiConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Reads whichever config files exist, for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::env::current_dir()
        .map(|d| d.join("kai.toml"))
        .unwrap_or_else(|_| "kai.toml".into())];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("kai/kai.toml"));
    }
    candidates.push("/etc/kai/kai.toml".into());

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}
