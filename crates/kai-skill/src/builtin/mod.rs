// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The six domain tools: task and event creation and listing, and chat
//! history reads.

pub mod conversations;
pub mod events;
pub mod tasks;

pub use conversations::{FetchGroupConversationTool, FetchUserConversationsTool};
pub use events::{CreateEventTool, GetEventsTool};
pub use tasks::{CreateTaskTool, GetTasksTool};

use std::sync::Arc;

use kai_core::types::ChatUser;
use kai_core::work::Notification;
use kai_core::{CacheService, ChatTransport, Notifier, WorkStore};
use tracing::warn;

use crate::ToolRegistry;

/// What the built-in tools talk to.
#[derive(Clone)]
pub struct ToolDeps {
    pub work: Arc<dyn WorkStore>,
    pub transport: Arc<dyn ChatTransport>,
    pub notifier: Arc<dyn Notifier>,
    /// Lower-cased username to chat user.
    pub user_cache: Arc<dyn CacheService<ChatUser>>,
}

/// Registers all six built-in tools.
pub fn register_builtins(registry: &mut ToolRegistry, deps: &ToolDeps) {
    registry.register(Arc::new(CreateTaskTool::new(deps.clone())));
    registry.register(Arc::new(GetTasksTool::new(deps.clone())));
    registry.register(Arc::new(CreateEventTool::new(deps.clone())));
    registry.register(Arc::new(GetEventsTool::new(deps.clone())));
    registry.register(Arc::new(FetchGroupConversationTool::new(deps.clone())));
    registry.register(Arc::new(FetchUserConversationsTool::new(deps.clone())));
}

/// Sends a notification unless it has no recipients. Failures are logged only.
pub(crate) async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if notification.recipients.is_empty() {
        return;
    }
    if let Err(e) = notifier.notify(&notification).await {
        warn!(
            kind = %notification.kind,
            reference_id = %notification.reference_id,
            error = %e,
            "notification failed"
        );
    }
}
