//! Gateway for the Anthropic Messages API.
//!
//! Turns are rendered into the wire message array, tool-result turns under
//! the `user` role as the API requires. Tool catalogs go out as `tools`
//! entries; replies come back as interleaved `text` and `tool_use` blocks
//! which map one-to-one onto [`ContentBlock`]s.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::logging::{obscure_credential, sanitize_for_logging};

use crate::registry::ToolSpec;
use crate::types::{ContentBlock, Turn, TurnRole};

use super::{GatewayError, ModelBackend, ModelReply, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Settings for one Anthropic-backed gateway.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
            temperature: None,
        }
    }
}

pub struct AnthropicGateway {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicGateway {
    pub fn new(config: AnthropicConfig) -> Self {
        debug!(
            model = %config.model,
            api_key = %obscure_credential(&config.api_key),
            "anthropic gateway ready"
        );
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ModelBackend for AnthropicGateway {
    async fn complete(
        &self,
        system: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, GatewayError> {
        let body = request_body(&self.config, system, turns, tools);
        debug!(
            model = %self.config.model,
            turns = turns.len(),
            tools = tools.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            warn!(
                status = status.as_u16(),
                body = %sanitize_for_logging(&text),
                "model endpoint rejected request"
            );
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

fn request_body(config: &AnthropicConfig, system: &str, turns: &[Turn], tools: &[ToolSpec]) -> Value {
    let mut body = json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "messages": wire_messages(turns),
    });
    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(wire_tool).collect());
    }
    if let Some(temperature) = config.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

fn wire_messages(turns: &[Turn]) -> Vec<Value> {
    turns
        .iter()
        .filter_map(|turn| {
            let role = match turn.role {
                TurnRole::User | TurnRole::ToolResult => "user",
                TurnRole::Assistant => "assistant",
            };
            let content: Vec<Value> = turn.content.iter().map(wire_block).collect();
            if content.is_empty() {
                None
            } else {
                Some(json!({ "role": role, "content": content }))
            }
        })
        .collect()
}

fn wire_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
        ContentBlock::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content.to_display_string(),
            "is_error": is_error.unwrap_or(false),
        }),
    }
}

fn wire_tool(spec: &ToolSpec) -> Value {
    json!({
        "name": spec.name,
        "description": spec.description,
        "input_schema": spec.input_schema,
    })
}

fn parse_reply(body: &Value) -> Result<ModelReply, GatewayError> {
    let content = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::malformed("reply has no content array"))?;

    let mut blocks = Vec::with_capacity(content.len());
    for block in content {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                let text = block
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::malformed("text block without text"))?;
                blocks.push(ContentBlock::text(text));
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::malformed("tool_use block without id"))?;
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::malformed("tool_use block without name"))?;
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                blocks.push(ContentBlock::tool_use(id, name, input));
            }
            other => {
                debug!(kind = ?other, "skipping unrecognized content block");
            }
        }
    }

    let stop_reason = body
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    let usage = body
        .get("usage")
        .and_then(Value::as_object)
        .map(|usage| TokenUsage {
            input_tokens: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            output_tokens: usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        });

    Ok(ModelReply {
        blocks,
        stop_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResultContent;

    fn config() -> AnthropicConfig {
        AnthropicConfig::new("sk-test", "claude-3-5-sonnet-20241022")
    }

    #[test]
    fn test_request_body_omits_empty_sections() {
        let turns = vec![Turn::user("hello")];
        let body = request_body(&config(), "", &turns, &[]);

        assert_eq!(body["model"], json!("claude-3-5-sonnet-20241022"));
        assert_eq!(body["max_tokens"], json!(4096));
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_request_body_includes_system_and_tools() {
        let turns = vec![Turn::user("hello")];
        let tools = vec![ToolSpec {
            name: "list_collections".to_string(),
            description: "List collections".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        let mut cfg = config();
        cfg.temperature = Some(0.2);

        let body = request_body(&cfg, "You are a data assistant.", &turns, &tools);
        assert_eq!(body["system"], json!("You are a data assistant."));
        assert_eq!(body["tools"][0]["name"], json!("list_collections"));
        assert_eq!(body["tools"][0]["input_schema"]["type"], json!("object"));
        assert_eq!(body["temperature"], json!(0.2));
    }

    #[test]
    fn test_tool_result_turns_go_out_under_user_role() {
        let turns = vec![
            Turn::user("count my tasks"),
            Turn::assistant(vec![
                ContentBlock::text("Counting."),
                ContentBlock::tool_use("call-1", "count_documents", json!({"collection": "tasks"})),
            ]),
            Turn::tool_result(ContentBlock::tool_result_success(
                "call-1",
                ToolResultContent::text("collection 'tasks' has 3 matching document(s)"),
            )),
        ];

        let messages = wire_messages(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], json!("user"));
        assert_eq!(messages[1]["role"], json!("assistant"));
        assert_eq!(messages[1]["content"][1]["type"], json!("tool_use"));
        assert_eq!(messages[2]["role"], json!("user"));
        assert_eq!(messages[2]["content"][0]["type"], json!("tool_result"));
        assert_eq!(messages[2]["content"][0]["tool_use_id"], json!("call-1"));
        assert_eq!(messages[2]["content"][0]["is_error"], json!(false));
    }

    #[test]
    fn test_parse_reply_decodes_interleaved_blocks() {
        let body = json!({
            "id": "msg_01",
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "call-1", "name": "list_collections", "input": {"identity": "ann"}}
            ],
            "usage": {"input_tokens": 120, "output_tokens": 18}
        });

        let reply = parse_reply(&body).unwrap();
        assert_eq!(reply.blocks.len(), 2);
        assert_eq!(reply.blocks[0], ContentBlock::text("Let me check."));
        assert!(reply.blocks[1].is_tool_use());
        assert_eq!(reply.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(
            reply.usage,
            Some(TokenUsage {
                input_tokens: 120,
                output_tokens: 18
            })
        );
    }

    #[test]
    fn test_parse_reply_rejects_missing_content() {
        let err = parse_reply(&json!({"id": "msg_02"})).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed { .. }));

        let err = parse_reply(&json!({
            "content": [{"type": "tool_use", "name": "list_collections"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("without id"));
    }

    #[test]
    fn test_parse_reply_skips_unknown_block_kinds() {
        let body = json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "done"}
            ]
        });
        let reply = parse_reply(&body).unwrap();
        assert_eq!(reply.blocks, vec![ContentBlock::text("done")]);
    }
}
