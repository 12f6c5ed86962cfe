// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Kai backend.

use thiserror::Error;

/// The primary error type used across all Kai adapter traits and core operations.
#[derive(Debug, Error)]
pub enum KaiError {
    /// Configuration errors (invalid TOML, missing API keys, bad values).
    ///
    /// Raised at construction time and fatal for the component being built.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat transport errors (HTTP failure, unexpected payload, missing message).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM provider errors (API failure, stream decode failure, failed run).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A tool handler failed. Fed back to the model, never surfaced to the user.
    #[error("tool `{tool}` failed: {message}")]
    Tool { tool: String, message: String },

    /// The model kept requesting tools past the configured round limit.
    #[error("tool-use loop exceeded after {max_rounds} rounds")]
    ToolLoopExceeded { max_rounds: usize },

    /// A best-effort notification could not be delivered.
    #[error("notification error: {0}")]
    Notification(String),

    /// Adapter health check failed.
    #[error("health check failed for {name}: {source}")]
    HealthCheckFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KaiError {
    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        KaiError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        KaiError::Transport {
            message: message.into(),
            source: None,
        }
    }
}
