// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry.
//!
//! The [`Tool`] trait is the interface every domain tool implements. The
//! [`ToolRegistry`] resolves tool calls by name and produces the shared
//! [`ToolDefinition`] list each provider translates into its own schema.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use kai_core::types::{MentionedUser, TimezoneContext, ToolDefinition};
use kai_core::KaiError;
use serde::{Deserialize, Serialize};

/// Output from a tool invocation, handed back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// JSON-encoded result.
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// `{"success": true, ...fields}`.
    pub fn success(fields: serde_json::Value) -> Self {
        let mut body = serde_json::Map::new();
        body.insert("success".to_string(), serde_json::Value::Bool(true));
        if let serde_json::Value::Object(map) = fields {
            body.extend(map);
        }
        Self {
            content: serde_json::Value::Object(body).to_string(),
            is_error: false,
        }
    }

    /// `{"success": false, "error": message}`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::json!({"success": false, "error": message.into()}).to_string(),
            is_error: true,
        }
    }
}

/// Who is calling a tool, and from where.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub channel_id: String,
    /// Users @-mentioned in the triggering message, for name resolution.
    pub mentioned_users: Vec<MentionedUser>,
    pub timezone: Option<TimezoneContext>,
    pub now: DateTime<Utc>,
}

impl ToolContext {
    /// The caller's UTC offset, or UTC when unknown.
    pub fn offset(&self) -> FixedOffset {
        self.timezone
            .as_ref()
            .map(TimezoneContext::offset)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// A named, schema-described function the model may invoke mid-generation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, used for lookup and in the provider schema.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the tool's arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Runs the tool.
    ///
    /// Invalid arguments are reported as a failed [`ToolOutput`]; `Err` is for
    /// failures of the systems behind the tool.
    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, KaiError>;
}

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool under its `name()`, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Definitions of the tools whose names are in `filter` (all tools when
    /// `None`), sorted by name.
    pub fn definitions(&self, filter: Option<&[&str]>) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| filter.is_none_or(|names| names.contains(&t.name())))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads an optional, non-blank string argument.
pub(crate) fn str_arg<'a>(input: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Reads an optional list of strings; a single string counts as a one-item list.
pub(crate) fn str_list_arg(input: &serde_json::Value, key: &str) -> Vec<String> {
    match input.get(key) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// `limit` argument: default 10, clamped to 1..=50.
pub(crate) fn limit_arg(input: &serde_json::Value) -> usize {
    input
        .get("limit")
        .and_then(serde_json::Value::as_u64)
        .map(|n| n.clamp(1, 50) as usize)
        .unwrap_or(10)
}
