//! Gateway for a local Ollama instance.
//!
//! Text-only: the chat endpoint takes flat role/content messages and the
//! reply is a single assistant message. Tool catalogs are dropped with a
//! warning, so conversations through this backend never enter tool rounds.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::registry::ToolSpec;
use crate::types::{ContentBlock, Turn, TurnRole};

use super::{GatewayError, ModelBackend, ModelReply, TokenUsage};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Settings for one Ollama-backed gateway.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub base_url: String,
}

impl OllamaConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

pub struct OllamaGateway {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaGateway {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ModelBackend for OllamaGateway {
    async fn complete(
        &self,
        system: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, GatewayError> {
        if !tools.is_empty() {
            warn!(
                model = %self.config.model,
                dropped = tools.len(),
                "backend does not support tool calling; tool catalog dropped"
            );
        }

        let body = request_body(&self.config, system, turns);
        debug!(model = %self.config.model, turns = turns.len(), "requesting completion");

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::network(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::network(format!("failed to read reply: {e}")))?;
        if !status.is_success() {
            return Err(GatewayError::http(status.as_u16(), text));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::malformed(format!("reply is not json: {e}")))?;
        parse_reply(&body)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

fn request_body(config: &OllamaConfig, system: &str, turns: &[Turn]) -> Value {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system.is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for turn in turns {
        let content = flat_content(turn);
        if content.is_empty() {
            continue;
        }
        let role = match turn.role {
            TurnRole::User | TurnRole::ToolResult => "user",
            TurnRole::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": content }));
    }

    json!({
        "model": config.model,
        "messages": messages,
        "stream": false,
    })
}

fn flat_content(turn: &Turn) -> String {
    turn.content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::ToolUse { name, .. } => format!("[tool call {name}]"),
            ContentBlock::ToolResult { content, .. } => content.to_display_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_reply(body: &Value) -> Result<ModelReply, GatewayError> {
    let message = body
        .get("message")
        .ok_or_else(|| GatewayError::malformed("reply has no message object"))?;
    let content = message.get("content").and_then(Value::as_str).unwrap_or("");

    let mut blocks = Vec::new();
    if !content.is_empty() {
        blocks.push(ContentBlock::text(content));
    }

    let stop_reason = body
        .get("done_reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    let input = body.get("prompt_eval_count").and_then(Value::as_u64);
    let output = body.get("eval_count").and_then(Value::as_u64);
    let usage = if input.is_none() && output.is_none() {
        None
    } else {
        Some(TokenUsage {
            input_tokens: input.unwrap_or(0) as u32,
            output_tokens: output.unwrap_or(0) as u32,
        })
    };

    Ok(ModelReply {
        blocks,
        stop_reason,
        usage,
    })
}
