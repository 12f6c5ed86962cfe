// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Kai integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Scripted LLM provider recording requests and tool turns
//! - [`MockTransport`] - In-memory chat platform capturing sends and updates
//! - [`MockNotifier`] - Notification sink
//! - [`TestHarness`] - Full agent stack over the mocks and a temp database

pub mod harness;
pub mod mock_provider;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_provider::{MockProvider, ScriptedRound};
pub use mock_transport::{MockNotifier, MockTransport, SentMessage};
