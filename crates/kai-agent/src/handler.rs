// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The streaming tool-call loop.
//!
//! One [`ResponseHandler::run`] drives a message through
//! `Streaming -> (ExecutingTools -> Resubmitting)* -> Finalizing`.
//! Text deltas are buffered, never forwarded. A round that ends with tool
//! calls executes them in order and resubmits every output in one batch;
//! after `max_rounds` such rounds the loop fails with
//! [`KaiError::ToolLoopExceeded`].

use std::sync::Arc;

use futures::StreamExt;
use kai_core::types::{ProviderRequest, RunHandle, StreamEvent, ToolCallRequest, ToolCallResult, ToolTurn};
use kai_core::{EventStream, KaiError, ProviderAdapter};
use kai_skill::{ToolContext, ToolOutput, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Output for tool names the registry does not know.
pub const UNKNOWN_FUNCTION: &str = "Unknown function";

/// Handler states, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Streaming,
    ExecutingTools,
    Resubmitting,
    Finalizing,
}

impl std::fmt::Display for HandlerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerState::Streaming => write!(f, "streaming"),
            HandlerState::ExecutingTools => write!(f, "executing_tools"),
            HandlerState::Resubmitting => write!(f, "resubmitting"),
            HandlerState::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// What a finished handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Text of the last model round, trimmed.
    pub text: String,
    /// Tool rounds executed.
    pub tool_rounds: usize,
    /// Whether stop-generating interrupted the run.
    pub cancelled: bool,
}

/// Everything one provider stream yielded.
#[derive(Debug, Default)]
struct Round {
    text: String,
    calls: Vec<ToolCallRequest>,
    run: Option<RunHandle>,
    stop_reason: Option<String>,
    cancelled: bool,
}

/// Drives one message's provider conversation to its final text.
pub struct ResponseHandler {
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    max_rounds: usize,
}

impl ResponseHandler {
    pub fn new(provider: Arc<dyn ProviderAdapter>, tools: Arc<ToolRegistry>, max_rounds: usize) -> Self {
        Self {
            provider,
            tools,
            max_rounds,
        }
    }

    /// Streams `request` and answers tool calls until the model stops asking.
    ///
    /// Cancelling `cancel` asks the provider to cancel the active run and
    /// returns whatever text was buffered so far.
    pub async fn run(
        &self,
        mut request: ProviderRequest,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, KaiError> {
        let mut stream = self.provider.stream(&request).await?;
        let mut tool_rounds = 0;

        loop {
            debug!(state = %HandlerState::Streaming, round = tool_rounds, "handler state");
            let round = self.consume(&mut stream, cancel).await?;

            if round.cancelled {
                if let Some(run) = &round.run
                    && let Err(e) = self.provider.cancel_run(run).await
                {
                    warn!(run_id = %run.run_id, error = %e, "run cancellation failed");
                }
                info!(channel_id = %ctx.channel_id, round = tool_rounds, "generation stopped");
                return Ok(HandlerOutcome {
                    text: round.text.trim().to_string(),
                    tool_rounds,
                    cancelled: true,
                });
            }

            if round.calls.is_empty() {
                debug!(
                    state = %HandlerState::Finalizing,
                    stop_reason = round.stop_reason.as_deref().unwrap_or(""),
                    "handler state"
                );
                return Ok(HandlerOutcome {
                    text: round.text.trim().to_string(),
                    tool_rounds,
                    cancelled: false,
                });
            }

            if tool_rounds >= self.max_rounds {
                warn!(
                    channel_id = %ctx.channel_id,
                    max_rounds = self.max_rounds,
                    "model kept requesting tools"
                );
                return Err(KaiError::ToolLoopExceeded {
                    max_rounds: self.max_rounds,
                });
            }
            tool_rounds += 1;

            debug!(state = %HandlerState::ExecutingTools, round = tool_rounds, calls = round.calls.len(), "handler state");
            let results = self.execute_tools(&round.calls, ctx).await;

            debug!(state = %HandlerState::Resubmitting, round = tool_rounds, "handler state");
            let turn = ToolTurn {
                assistant_text: round.text,
                calls: round.calls,
                results,
            };
            stream = self
                .provider
                .submit_tool_outputs(&mut request, round.run.as_ref(), turn)
                .await?;
        }
    }

    /// Reads one stream to its end, or until `cancel` fires.
    async fn consume(
        &self,
        stream: &mut EventStream,
        cancel: &CancellationToken,
    ) -> Result<Round, KaiError> {
        let mut round = Round::default();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    round.cancelled = true;
                    return Ok(round);
                }
                event = stream.next() => event,
            };
            match event {
                Some(Ok(StreamEvent::RunStarted(run))) => {
                    debug!(run_id = %run.run_id, "run started");
                    round.run = Some(run);
                }
                Some(Ok(StreamEvent::TextDelta(text))) => round.text.push_str(&text),
                Some(Ok(StreamEvent::ToolCallRequested(call))) => {
                    debug!(tool = %call.name, call_id = %call.id, "tool requested");
                    round.calls.push(call);
                }
                Some(Ok(StreamEvent::StreamEnded { stop_reason })) => {
                    round.stop_reason = stop_reason;
                    return Ok(round);
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(round),
            }
        }
    }

    /// Runs every call in order. Each call id receives exactly one output.
    async fn execute_tools(&self, calls: &[ToolCallRequest], ctx: &ToolContext) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let output = match self.tools.get(&call.name) {
                None => {
                    warn!(tool = %call.name, "model requested an unknown tool");
                    UNKNOWN_FUNCTION.to_string()
                }
                Some(tool) => match tool.invoke(call.input.clone(), ctx).await {
                    Ok(output) => {
                        debug!(tool = %call.name, is_error = output.is_error, "tool finished");
                        output.content
                    }
                    Err(e) => {
                        let err = KaiError::Tool {
                            tool: call.name.clone(),
                            message: e.to_string(),
                        };
                        warn!(error = %err, "tool failed");
                        ToolOutput::failure(e.to_string()).content
                    }
                },
            };
            results.push(ToolCallResult {
                tool_call_id: call.id.clone(),
                output,
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use kai_skill::Tool;
    use kai_test_utils::MockProvider;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, input: serde_json::Value, _: &ToolContext) -> Result<ToolOutput, KaiError> {
            Ok(ToolOutput::success(json!({"echo": input})))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, _: serde_json::Value, _: &ToolContext) -> Result<ToolOutput, KaiError> {
            Err(KaiError::Internal("database is locked".into()))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(Broken));
        Arc::new(registry)
    }

    fn ctx() -> ToolContext {
        ToolContext {
            user_id: "u1".into(),
            channel_id: "kai-u1".into(),
            mentioned_users: vec![],
            timezone: None,
            now: Utc::now(),
        }
    }

    fn call(id: &str, name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            input: json!({"n": id}),
        }
    }

    #[tokio::test]
    async fn plain_reply_needs_no_tools() {
        let provider = Arc::new(MockProvider::new().with_text_round("  Hello there!  "));
        let handler = ResponseHandler::new(provider.clone(), registry(), 3);
        let outcome = handler
            .run(ProviderRequest::default(), &ctx(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "Hello there!");
        assert_eq!(outcome.tool_rounds, 0);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn every_call_gets_one_output_even_unknown_or_failing() {
        let provider = Arc::new(
            MockProvider::new()
                .with_tool_round(
                    "Working on it.",
                    vec![call("c1", "echo"), call("c2", "nope"), call("c3", "broken")],
                )
                .with_text_round("Done."),
        );
        let handler = ResponseHandler::new(provider.clone(), registry(), 3);
        let outcome = handler
            .run(ProviderRequest::default(), &ctx(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "Done.");
        assert_eq!(outcome.tool_rounds, 1);

        let turns = provider.tool_turns();
        assert_eq!(turns.len(), 1);
        let results = &turns[0].results;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].tool_call_id, "c1");
        assert!(results[0].output.contains("\"success\":true"));
        assert_eq!(results[1].output, UNKNOWN_FUNCTION);
        let failed: serde_json::Value = serde_json::from_str(&results[2].output).unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["error"], "internal error: database is locked");
        assert_eq!(turns[0].assistant_text, "Working on it.");
    }

    #[tokio::test]
    async fn final_text_is_last_round_only() {
        let provider = Arc::new(
            MockProvider::new()
                .with_tool_round("Let me check. ", vec![call("c1", "echo")])
                .with_text_round("You have two tasks."),
        );
        let handler = ResponseHandler::new(provider, registry(), 3);
        let outcome = handler
            .run(ProviderRequest::default(), &ctx(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "You have two tasks.");
    }

    #[tokio::test]
    async fn tool_loop_is_bounded() {
        let mut provider = MockProvider::new();
        for i in 0..5 {
            provider = provider.with_tool_round("", vec![call(&format!("c{i}"), "echo")]);
        }
        let provider = Arc::new(provider);
        let handler = ResponseHandler::new(provider.clone(), registry(), 2);
        let err = handler
            .run(ProviderRequest::default(), &ctx(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KaiError::ToolLoopExceeded { max_rounds: 2 }));
        assert_eq!(provider.tool_turns().len(), 2);
    }

    #[tokio::test]
    async fn provider_stream_error_propagates() {
        let provider = Arc::new(MockProvider::new().with_error_round("overloaded"));
        let handler = ResponseHandler::new(provider, registry(), 3);
        let err = handler
            .run(ProviderRequest::default(), &ctx(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KaiError::Provider { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_and_cancels_the_run() {
        let provider = Arc::new(MockProvider::new().with_stalled_round("run_9", "Partial"));
        let handler = ResponseHandler::new(provider.clone(), registry(), 3);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = handler
            .run(ProviderRequest::default(), &ctx(), &cancel)
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.text, "Partial");
        assert_eq!(provider.cancelled_runs(), vec!["run_9".to_string()]);
    }

    #[test]
    fn state_display() {
        assert_eq!(HandlerState::ExecutingTools.to_string(), "executing_tools");
        assert_eq!(HandlerState::Finalizing.to_string(), "finalizing");
    }
}
