// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Kai assistant.
//!
//! Receives chat-platform webhooks and slash commands, authenticates them
//! (bearer token or body signature, fail-closed) and hands messages to the
//! [`kai_agent::Agent`] in the background.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{AuthConfig, sign, verify_signature};
pub use server::{GatewayState, ServerConfig, router, start_server};
