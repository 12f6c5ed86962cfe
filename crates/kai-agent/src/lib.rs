// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message handling for the Kai assistant.
//!
//! The [`Agent`] is the central coordinator that:
//! - Picks the profile and memory mode for an inbound message
//! - Assembles the system prompt and conversation window
//! - Drives the provider through the tool-call loop
//! - Classifies the reply and writes it back with metadata
//! - Tracks live handlers for stop-generating and shutdown

pub mod attachments;
pub mod classifier;
pub mod context;
pub mod handler;
pub mod profile;
pub mod shutdown;
pub mod stop;

use std::sync::Arc;

use chrono::Utc;
use kai_config::model::{AgentConfig, CacheConfig, KaiConfig};
use kai_core::types::{
    AiState, Attachment, ConversationTurn, MentionedUser, MessageId, MessageMetadata,
    MessageUpdate, OutgoingMessage, PendingPatch, ProviderRequest, Thread, TimezoneContext,
    trim_history,
};
use kai_core::{
    CacheService, ChatTransport, KaiError, PatchOutbox, ProviderAdapter, ThreadStore, TtlCache,
    WorkStore,
};
use kai_skill::{ToolContext, ToolRegistry};
use tracing::{debug, error, info, warn};

use crate::handler::ResponseHandler;
use crate::profile::{Profile, ProfileKind, Profiles};
use crate::stop::StopRegistry;

pub use crate::handler::HandlerOutcome;
pub use crate::profile::KAI_TOOLS;

/// How much conversation memory a message gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Throwaway context built from the user's recent activity.
    Ephemeral,
    /// Stored thread history.
    Persistent,
    /// Single-shot task/event detection.
    Detection,
}

impl Mode {
    fn select(profile: ProfileKind, persistent: bool) -> Self {
        match (profile, persistent) {
            (ProfileKind::Detector, _) => Mode::Detection,
            (ProfileKind::Kai, true) => Mode::Persistent,
            (ProfileKind::Kai, false) => Mode::Ephemeral,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Ephemeral => write!(f, "ephemeral"),
            Mode::Persistent => write!(f, "persistent"),
            Mode::Detection => write!(f, "detection"),
        }
    }
}

/// One inbound message and everything known about it.
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    /// Message to update instead of sending a new one. For group channels
    /// this is the user's own message, which only receives metadata.
    pub message_id: Option<MessageId>,
    pub attachments: Vec<Attachment>,
    pub persistent: bool,
    pub mentioned_users: Vec<MentionedUser>,
    pub timezone: Option<TimezoneContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyMessage,
    EmptyReply,
}

/// What [`Agent::handle_message`] did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing was written.
    Skipped(SkipReason),
    Delivered {
        mode: Mode,
        /// The message that carries the reply or the metadata, if any.
        message_id: Option<MessageId>,
        text: String,
        metadata: MessageMetadata,
        tool_rounds: usize,
        cancelled: bool,
    },
    /// The message failed; the error was logged.
    Failed(String),
}

/// External collaborators of the agent.
#[derive(Clone)]
pub struct AgentDeps {
    pub provider: Arc<dyn ProviderAdapter>,
    pub transport: Arc<dyn ChatTransport>,
    pub threads: Arc<dyn ThreadStore>,
    pub work: Arc<dyn WorkStore>,
    pub outbox: Arc<dyn PatchOutbox>,
    pub tools: Arc<ToolRegistry>,
    pub caches: AgentCaches,
}

/// Caches owned by the agent.
#[derive(Clone)]
pub struct AgentCaches {
    /// Ephemeral summary context per user id.
    pub user_context: Arc<dyn CacheService<String>>,
    /// Conversation history per `channel:user` pair.
    pub history: Arc<dyn CacheService<Vec<ConversationTurn>>>,
}

impl AgentCaches {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            user_context: Arc::new(TtlCache::new(std::time::Duration::from_secs(
                config.user_context_ttl_secs,
            ))),
            history: Arc::new(TtlCache::new(std::time::Duration::from_secs(
                config.history_ttl_secs,
            ))),
        }
    }
}

/// Routes chat messages to the provider and writes replies back.
pub struct Agent {
    config: AgentConfig,
    thread_ttl: chrono::Duration,
    profiles: Profiles,
    deps: AgentDeps,
    stops: StopRegistry,
}

impl Agent {
    /// Builds the agent. Unreadable prompt files fail here.
    pub fn new(config: &KaiConfig, deps: AgentDeps) -> Result<Self, KaiError> {
        let profiles = Profiles::from_config(&config.agent, &config.prompts)?;
        let thread_ttl = chrono::Duration::try_days(config.threads.ttl_days).ok_or_else(|| {
            KaiError::Config(format!("threads.ttl_days out of range: {}", config.threads.ttl_days))
        })?;
        info!(
            agent_name = config.agent.name.as_str(),
            provider = deps.provider.name(),
            tools = deps.tools.len(),
            "agent initialized"
        );
        Ok(Self {
            config: config.agent.clone(),
            thread_ttl,
            profiles,
            deps,
            stops: StopRegistry::new(),
        })
    }

    /// The stop-generating registry of this agent.
    pub fn stops(&self) -> &StopRegistry {
        &self.stops
    }

    pub fn bot_user_id(&self) -> &str {
        &self.config.bot_user_id
    }

    /// Whether `channel_id` is served by the assistant profile.
    pub fn is_kai_channel(&self, channel_id: &str) -> bool {
        self.profiles.select(channel_id).kind == ProfileKind::Kai
    }

    /// Handles one message. Never fails: errors are logged, the AI
    /// indicator is cleared and the configured fallback (if any) is sent.
    pub async fn handle_message(&self, request: AgentRequest) -> Outcome {
        if request.text.trim().is_empty() {
            debug!(channel_id = %request.channel_id, "empty message, skipping");
            return Outcome::Skipped(SkipReason::EmptyMessage);
        }

        let profile = self.profiles.select(&request.channel_id);
        let mode = Mode::select(profile.kind, request.persistent);
        debug!(
            channel_id = %request.channel_id,
            user_id = %request.user_id,
            mode = %mode,
            "handling message"
        );

        match self.process(&request, profile, mode).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    channel_id = %request.channel_id,
                    user_id = %request.user_id,
                    mode = %mode,
                    error = %e,
                    "message handling failed"
                );
                self.set_indicator(&request.channel_id, AiState::Clear).await;
                if profile.kind == ProfileKind::Kai {
                    self.send_fallback(&request.channel_id).await;
                }
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Cancels every live handler in `channel_id`.
    pub fn stop_generating(&self, channel_id: &str) -> usize {
        let stopped = self.stops.stop(channel_id);
        info!(channel_id, stopped, "stop generating requested");
        stopped
    }

    /// Re-applies patches left pending by an earlier process.
    ///
    /// Stops at the first failure; the failed patch keeps its remaining
    /// attempts for the next replay.
    pub async fn replay_outbox(&self) -> Result<usize, KaiError> {
        let mut applied = 0;
        while let Some((id, patch)) = self.deps.outbox.next_pending_patch().await? {
            match self
                .deps
                .transport
                .update_message(&patch.message_id, patch.update)
                .await
            {
                Ok(()) => {
                    self.deps.outbox.complete_patch(id).await?;
                    applied += 1;
                }
                Err(e) => {
                    warn!(id, message_id = %patch.message_id, error = %e, "patch replay failed");
                    self.deps.outbox.fail_patch(id).await?;
                    break;
                }
            }
        }
        if applied > 0 {
            info!(applied, "outbox replayed");
        }
        Ok(applied)
    }

    /// Cancels every live handler.
    pub fn dispose(&self) {
        let cancelled = self.stops.cancel_all();
        info!(cancelled, "agent disposed");
    }

    async fn process(
        &self,
        request: &AgentRequest,
        profile: &Profile,
        mode: Mode,
    ) -> Result<Outcome, KaiError> {
        let ctx = ToolContext {
            user_id: request.user_id.clone(),
            channel_id: request.channel_id.clone(),
            mentioned_users: request.mentioned_users.clone(),
            timezone: request.timezone.clone(),
            now: Utc::now(),
        };

        let thread = match mode {
            Mode::Detection => None,
            Mode::Ephemeral | Mode::Persistent => Some(self.ensure_thread(request).await?),
        };

        self.set_indicator(&request.channel_id, AiState::Thinking).await;

        let mut history = Vec::new();
        let provider_request = match (mode, &thread) {
            (Mode::Persistent, Some(thread)) => {
                let prior = self.load_history(thread);
                let turn = self.user_turn(request).await;
                // The provider sees the new turn with its attachment blocks;
                // storage keeps only the flattened text.
                let mut messages =
                    context::request_window(&prior, self.config.history_window.saturating_sub(1));
                messages.push(turn.clone());

                history = prior;
                history.push(turn);
                history = trim_history(
                    &history,
                    self.config.history_window,
                    self.config.history_max_chars,
                );
                self.store_history(request, &history).await?;

                let mut sections = Vec::new();
                if context::mentions_work(&request.text) {
                    sections.push(
                        context::work_summary(
                            self.deps.work.as_ref(),
                            &request.user_id,
                            ctx.now,
                            ctx.offset(),
                        )
                        .await?,
                    );
                }
                ProviderRequest {
                    system_prompt: Some(self.system_prompt(profile, &ctx, &sections)),
                    messages,
                    tools: self.deps.tools.definitions(Some(profile.tools)),
                    conversation_id: Some(thread.provider_thread_id.clone()),
                    ..Default::default()
                }
            }
            (Mode::Detection, _) => ProviderRequest {
                system_prompt: Some(self.system_prompt(profile, &ctx, &[])),
                messages: vec![ConversationTurn::user(request.text.trim())],
                ..Default::default()
            },
            _ => {
                let summary = self.user_context(&ctx).await?;
                ProviderRequest {
                    system_prompt: Some(self.system_prompt(profile, &ctx, &[summary])),
                    messages: vec![self.user_turn(request).await],
                    tools: self.deps.tools.definitions(Some(profile.tools)),
                    ..Default::default()
                }
            }
        };

        self.set_indicator(&request.channel_id, AiState::Generating).await;

        let handler = ResponseHandler::new(
            self.deps.provider.clone(),
            self.deps.tools.clone(),
            self.config.max_tool_rounds,
        );
        let reply = {
            let guard = self.stops.register(&request.channel_id);
            handler.run(provider_request, &ctx, guard.token()).await?
        };

        if reply.text.is_empty() {
            info!(
                channel_id = %request.channel_id,
                cancelled = reply.cancelled,
                "empty reply, nothing sent"
            );
            self.set_indicator(&request.channel_id, AiState::Clear).await;
            return Ok(Outcome::Skipped(SkipReason::EmptyReply));
        }

        let metadata: MessageMetadata =
            classifier::classify(&reply.text, profile.heuristic).into();

        let message_id = match profile.kind {
            ProfileKind::Kai => Some(self.deliver(request, &reply.text, &metadata).await?),
            ProfileKind::Detector => {
                if let Some(id) = &request.message_id {
                    self.apply_patch(PendingPatch {
                        message_id: id.clone(),
                        update: MessageUpdate {
                            text: None,
                            extra: metadata.clone(),
                        },
                    })
                    .await;
                }
                request.message_id.clone()
            }
        };

        if mode == Mode::Persistent {
            history.push(ConversationTurn::assistant(reply.text.clone()));
            let history = trim_history(
                &history,
                self.config.history_window,
                self.config.history_max_chars,
            );
            if let Err(e) = self.store_history(request, &history).await {
                warn!(channel_id = %request.channel_id, error = %e, "assistant turn not saved");
            }
        }

        self.set_indicator(&request.channel_id, AiState::Clear).await;
        info!(
            channel_id = %request.channel_id,
            mode = %mode,
            tool_rounds = reply.tool_rounds,
            istask = metadata.istask,
            isevent = metadata.isevent,
            "reply delivered"
        );

        Ok(Outcome::Delivered {
            mode,
            message_id,
            text: reply.text,
            metadata,
            tool_rounds: reply.tool_rounds,
            cancelled: reply.cancelled,
        })
    }

    /// Finds or creates the thread of the (channel, user) pair.
    ///
    /// A provider conversation is opened only when no live thread exists.
    /// The thread returned by the upsert is authoritative, so concurrent
    /// first messages converge on one conversation.
    async fn ensure_thread(&self, request: &AgentRequest) -> Result<Thread, KaiError> {
        let existing = self
            .deps
            .threads
            .get_thread(&request.channel_id, &request.user_id)
            .await?;
        let provider_thread_id = match existing {
            Some(thread) => thread.provider_thread_id,
            None => self.deps.provider.open_conversation().await?,
        };
        let thread = self
            .deps
            .threads
            .upsert_thread(
                &request.channel_id,
                &request.user_id,
                &provider_thread_id,
                self.thread_ttl,
            )
            .await?;
        if thread.provider_thread_id != provider_thread_id {
            debug!(
                channel_id = %request.channel_id,
                thread_id = %thread.provider_thread_id,
                "joined concurrently created thread"
            );
        }
        Ok(thread)
    }

    fn history_key(request: &AgentRequest) -> String {
        format!("{}:{}", request.channel_id, request.user_id)
    }

    fn load_history(&self, thread: &Thread) -> Vec<ConversationTurn> {
        let key = format!("{}:{}", thread.channel_id, thread.user_id);
        self.deps
            .caches
            .history
            .get(&key)
            .unwrap_or_else(|| thread.conversation_history.clone())
    }

    async fn store_history(
        &self,
        request: &AgentRequest,
        history: &[ConversationTurn],
    ) -> Result<(), KaiError> {
        self.deps
            .threads
            .save_history(&request.channel_id, &request.user_id, history)
            .await?;
        self.deps
            .caches
            .history
            .set(&Self::history_key(request), history.to_vec());
        Ok(())
    }

    async fn user_context(&self, ctx: &ToolContext) -> Result<String, KaiError> {
        if let Some(cached) = self.deps.caches.user_context.get(&ctx.user_id) {
            debug!(user_id = %ctx.user_id, "user context cache hit");
            return Ok(cached);
        }
        let summary = context::user_summary(
            self.deps.transport.as_ref(),
            self.deps.work.as_ref(),
            &ctx.user_id,
            ctx.now,
            self.config.summary_lookback_days,
            ctx.offset(),
        )
        .await?;
        self.deps.caches.user_context.set(&ctx.user_id, summary.clone());
        Ok(summary)
    }

    async fn user_turn(&self, request: &AgentRequest) -> ConversationTurn {
        attachments::build_user_turn(
            request.text.trim(),
            &request.attachments,
            self.deps.transport.as_ref(),
            self.deps.provider.as_ref(),
        )
        .await
    }

    fn system_prompt(&self, profile: &Profile, ctx: &ToolContext, sections: &[String]) -> String {
        context::compose_system_prompt(
            &profile.system_prompt,
            ctx.timezone.as_ref(),
            ctx.now,
            sections,
        )
    }

    /// Writes a Kai reply: updates the placeholder when one was given,
    /// otherwise sends a new message marked as processing and patches its
    /// metadata through the outbox.
    async fn deliver(
        &self,
        request: &AgentRequest,
        text: &str,
        metadata: &MessageMetadata,
    ) -> Result<MessageId, KaiError> {
        if let Some(id) = &request.message_id {
            self.apply_patch(PendingPatch {
                message_id: id.clone(),
                update: MessageUpdate {
                    text: Some(text.to_string()),
                    extra: metadata.clone(),
                },
            })
            .await;
            return Ok(id.clone());
        }

        let id = self
            .deps
            .transport
            .send_message(
                &request.channel_id,
                OutgoingMessage {
                    text: text.to_string(),
                    user_id: self.config.bot_user_id.clone(),
                    extra: MessageMetadata::processing(),
                },
            )
            .await?;
        self.apply_patch(PendingPatch {
            message_id: id.clone(),
            update: MessageUpdate {
                text: None,
                extra: metadata.clone(),
            },
        })
        .await;
        Ok(id)
    }

    /// Records the patch, applies it and settles the outbox entry.
    /// Returns whether the transport accepted it.
    async fn apply_patch(&self, patch: PendingPatch) -> bool {
        let entry = match self.deps.outbox.record_patch(&patch).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(message_id = %patch.message_id, error = %e, "patch not recorded in outbox");
                None
            }
        };

        let applied = match self
            .deps
            .transport
            .update_message(&patch.message_id, patch.update.clone())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id = %patch.message_id, error = %e, "metadata patch failed");
                false
            }
        };

        if let Some(id) = entry {
            let settled = if applied {
                self.deps.outbox.complete_patch(id).await
            } else {
                self.deps.outbox.fail_patch(id).await
            };
            if let Err(e) = settled {
                warn!(id, error = %e, "outbox entry not settled");
            }
        }
        applied
    }

    async fn set_indicator(&self, channel_id: &str, state: AiState) {
        if let Err(e) = self.deps.transport.set_ai_state(channel_id, state).await {
            debug!(channel_id, state = %state, error = %e, "failed to set AI indicator");
        }
    }

    async fn send_fallback(&self, channel_id: &str) {
        let Some(text) = self.config.fallback_message.as_ref().filter(|t| !t.trim().is_empty())
        else {
            return;
        };
        let message = OutgoingMessage {
            text: text.clone(),
            user_id: self.config.bot_user_id.clone(),
            extra: MessageMetadata::default(),
        };
        if let Err(e) = self.deps.transport.send_message(channel_id, message).await {
            warn!(channel_id, error = %e, "failed to send fallback message");
        }
    }
}
