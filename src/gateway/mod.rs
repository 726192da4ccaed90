//! Model gateways.
//!
//! A gateway is a pure translation layer: it renders the system prompt,
//! transcript, and tool catalog into one backend request, and decodes the
//! reply into content blocks. It never retries, never edits the transcript,
//! and never interprets tool calls. Any [`GatewayError`] is fatal to the
//! round that issued the request; the orchestration loop decides what
//! survives in the transcript.

pub mod anthropic;
pub mod ollama;

pub use anthropic::{AnthropicConfig, AnthropicGateway};
pub use ollama::{OllamaConfig, OllamaGateway};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ToolSpec;
use crate::types::{ContentBlock, Turn};

/// Failure while talking to a model backend.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("model endpoint returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed model reply: {message}")]
    Malformed { message: String },

    #[error("model call timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl GatewayError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }
}

/// Token accounting as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One decoded model reply: content blocks in the order the model produced
/// them, plus whatever metadata the backend reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl ModelReply {
    pub fn new(blocks: Vec<ContentBlock>) -> Self {
        Self {
            blocks,
            stop_reason: None,
            usage: None,
        }
    }

    /// All text blocks, newline-joined.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_tool_use(&self) -> bool {
        self.blocks.iter().any(ContentBlock::is_tool_use)
    }
}

/// A completion backend. Implementations translate and transport; they hold
/// no conversation state of their own.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Request one completion over the full transcript.
    async fn complete(
        &self,
        system: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, GatewayError>;

    /// Model identifier, for logs.
    fn model_id(&self) -> &str;
}

impl std::fmt::Debug for dyn ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display_carries_detail() {
        assert_eq!(
            GatewayError::network("connection refused").to_string(),
            "network error: connection refused"
        );
        assert_eq!(
            GatewayError::http(429, "rate limited").to_string(),
            "model endpoint returned 429: rate limited"
        );
        assert!(GatewayError::timeout(Duration::from_secs(120))
            .to_string()
            .contains("120s"));
    }

    #[test]
    fn test_reply_text_joins_text_blocks_only() {
        let reply = ModelReply::new(vec![
            ContentBlock::text("first"),
            ContentBlock::tool_use("call-1", "list_collections", json!({})),
            ContentBlock::text("second"),
        ]);
        assert_eq!(reply.text(), "first\nsecond");
        assert!(reply.has_tool_use());

        let quiet = ModelReply::new(vec![ContentBlock::text("done")]);
        assert!(!quiet.has_tool_use());
    }
}
