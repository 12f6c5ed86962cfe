// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait, registry, and the built-in domain tools.
//!
//! The [`ToolRegistry`] resolves the model's tool calls by name and produces
//! the provider-neutral definitions sent with every request. The built-in
//! tools create and list tasks and events and read chat history:
//! - [`builtin::CreateTaskTool`] / [`builtin::GetTasksTool`]
//! - [`builtin::CreateEventTool`] / [`builtin::GetEventsTool`]
//! - [`builtin::FetchGroupConversationTool`] / [`builtin::FetchUserConversationsTool`]

pub mod builtin;
pub mod dates;
pub mod mentions;
pub mod tool;

pub use builtin::{ToolDeps, register_builtins};
pub use tool::{Tool, ToolContext, ToolOutput, ToolRegistry};
