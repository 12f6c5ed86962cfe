// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification hand-off for task assignments and event invitations.

use async_trait::async_trait;

use crate::error::KaiError;
use crate::work::Notification;

/// Delivers notifications. Callers treat every failure as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), KaiError>;
}
