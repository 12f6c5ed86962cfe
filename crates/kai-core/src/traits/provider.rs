// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM integrations (Anthropic, OpenAI Assistants).

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::KaiError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, RunHandle, StreamEvent, ToolTurn};

/// A stream of provider-neutral events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, KaiError>> + Send>>;

/// Adapter for LLM provider integrations.
///
/// Implementations translate their wire protocol into [`StreamEvent`]s so the
/// response handler never sees provider-specific events.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Creates the provider-side conversation handle for a new thread.
    async fn open_conversation(&self) -> Result<String, KaiError>;

    /// Starts a streaming completion.
    async fn stream(&self, request: &ProviderRequest) -> Result<EventStream, KaiError>;

    /// Sends the outputs of one tool round and returns the continuation stream.
    ///
    /// The default suits providers without a resume primitive: the assistant
    /// tool-use turn and the tool-result turn are appended to the request
    /// history and a brand-new completion is started.
    async fn submit_tool_outputs(
        &self,
        request: &mut ProviderRequest,
        run: Option<&RunHandle>,
        turn: ToolTurn,
    ) -> Result<EventStream, KaiError> {
        let _ = run;
        request.messages.extend(turn.into_turns());
        self.stream(request).await
    }

    /// Best-effort cancellation of an in-flight run. No-op by default.
    async fn cancel_run(&self, run: &RunHandle) -> Result<(), KaiError> {
        let _ = run;
        Ok(())
    }

    /// Uploads a document to the provider's file store.
    ///
    /// Returns `None` when the provider has no file store.
    async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Option<String>, KaiError> {
        let _ = (filename, mime_type, bytes);
        Ok(None)
    }
}
