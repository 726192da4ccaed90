//! The round loop that drives one user message to a final reply.
//!
//! Each round sends the full transcript to the model and appends exactly one
//! assistant turn with the reply blocks in model order. Every tool-use block
//! is then dispatched sequentially, and each result lands in its own
//! tool-result turn, in call order, before the next round begins. A reply
//! without tool calls ends the conversation turn; the user-visible reply is
//! the newline-joined text of every round.
//!
//! Transcript safety: the window is enforced before the user turn is
//! appended, gateway failures leave no half-written round behind, and
//! cancellation fills in failure results for any tool calls that never ran
//! so no tool-use turn is left unanswered.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::conversation::SlidingWindow;
use crate::dispatch::ToolDispatcher;
use crate::error::DocentError;
use crate::gateway::{GatewayError, ModelBackend, TokenUsage};
use crate::types::{ContentBlock, Transcript, Turn};

/// Limits for one conversation turn.
#[derive(Debug, Clone, Copy)]
pub struct RoundConfig {
    /// Rounds allowed per user message before giving up.
    pub max_rounds: u32,
    /// Ceiling on any single model call.
    pub gateway_timeout: Duration,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            max_rounds: 12,
            gateway_timeout: Duration::from_secs(120),
        }
    }
}

/// What one completed conversation turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// Newline-joined text of every round, trimmed.
    pub reply: String,
    /// Rounds consumed.
    pub rounds: u32,
    /// Tool calls dispatched.
    pub tool_calls: usize,
    /// Token usage accumulated across rounds.
    pub usage: TokenUsage,
}

/// Drives rounds for one message against a transcript.
pub struct RoundEngine {
    backend: Arc<dyn ModelBackend>,
    dispatcher: ToolDispatcher,
    window: SlidingWindow,
    system_prompt: String,
    config: RoundConfig,
}

impl RoundEngine {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        dispatcher: ToolDispatcher,
        window: SlidingWindow,
        system_prompt: impl Into<String>,
        config: RoundConfig,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            window,
            system_prompt: system_prompt.into(),
            config,
        }
    }

    /// Handle one user message. On success the transcript ends with the
    /// final assistant turn; on failure it is left without dangling
    /// tool-use turns so the next message can proceed.
    pub async fn run(
        &self,
        transcript: &mut Transcript,
        identity: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> crate::Result<RoundOutcome> {
        let trimmed = self.window.apply(transcript);
        if trimmed.removed > 0 {
            debug!(
                removed = trimmed.removed,
                widened = trimmed.widened_by,
                "trimmed conversation window"
            );
        }
        transcript.push(Turn::user(message));

        let mut reply_parts: Vec<String> = Vec::new();
        let mut tool_calls = 0;
        let mut usage = TokenUsage::default();

        for round in 1..=self.config.max_rounds {
            if cancel.is_cancelled() {
                return Err(DocentError::cancelled("message handling cancelled"));
            }

            let tools = self.dispatcher.registry().tool_specs().await;
            debug!(round, tools = tools.len(), turns = transcript.len(), "starting round");

            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(DocentError::cancelled("message handling cancelled"));
                }
                result = tokio::time::timeout(
                    self.config.gateway_timeout,
                    self.backend.complete(&self.system_prompt, transcript.turns(), &tools),
                ) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(GatewayError::timeout(self.config.gateway_timeout)),
                },
            };
            let reply = completion?;

            if let Some(round_usage) = reply.usage {
                usage.input_tokens += round_usage.input_tokens;
                usage.output_tokens += round_usage.output_tokens;
            }

            if reply.blocks.is_empty() {
                debug!(round, "model returned no content; ending turn");
                return Ok(RoundOutcome {
                    reply: join_reply(&reply_parts),
                    rounds: round,
                    tool_calls,
                    usage,
                });
            }

            let round_text = reply.text();
            if !round_text.is_empty() {
                reply_parts.push(round_text);
            }

            let calls: Vec<(String, String, serde_json::Value)> = reply
                .blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            transcript.push(Turn::assistant(reply.blocks));

            if calls.is_empty() {
                debug!(round, "model finished without tool calls");
                return Ok(RoundOutcome {
                    reply: join_reply(&reply_parts),
                    rounds: round,
                    tool_calls,
                    usage,
                });
            }

            tool_calls += calls.len();
            for (index, (id, name, input)) in calls.iter().enumerate() {
                if cancel.is_cancelled() {
                    fail_remaining(transcript, &calls[index..]);
                    return Err(DocentError::cancelled("message handling cancelled"));
                }
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    outcome = self.dispatcher.invoke(name, input.clone(), identity) => {
                        Some(outcome)
                    }
                };
                match outcome {
                    Some(outcome) => {
                        transcript.push(Turn::tool_result(outcome.to_result_block(id)));
                    }
                    None => {
                        fail_remaining(transcript, &calls[index..]);
                        return Err(DocentError::cancelled("message handling cancelled"));
                    }
                }
            }
        }

        warn!(
            limit = self.config.max_rounds,
            "round limit reached without a final reply"
        );
        Err(DocentError::max_rounds_exceeded(self.config.max_rounds))
    }
}

/// Answer every remaining call with a failure result so the transcript
/// stays pairwise complete.
fn fail_remaining(transcript: &mut Transcript, calls: &[(String, String, serde_json::Value)]) {
    for (id, name, _) in calls {
        debug!(tool = %name, "synthesizing cancelled tool result");
        transcript.push(Turn::tool_result(ContentBlock::tool_result_error(
            id,
            format!("tool call '{name}' was cancelled before completion"),
        )));
    }
}

fn join_reply(parts: &[String]) -> String {
    parts.join("\n").trim().to_string()
}
