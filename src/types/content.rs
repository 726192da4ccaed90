//! Content blocks carried by transcript turns.
//!
//! Blocks use the tagged wire representation the model protocol expects:
//! `{"type": "text", ...}`, `{"type": "tool_use", ...}`,
//! `{"type": "tool_result", ...}`. Order within a turn is significant: the
//! orchestration loop preserves block order exactly as the model emitted it
//! so a replayed transcript reconstructs the original response.

use serde::{Deserialize, Serialize};

/// A single content block within a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Natural-language text.
    Text { text: String },

    /// A tool invocation requested by the model. `id` is the call identifier
    /// the matching tool result must carry.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The outcome of a tool invocation, paired to its request by
    /// `tool_use_id`.
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool-use block.
    pub fn tool_use<S: Into<String>, N: Into<String>>(
        id: S,
        name: N,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a successful tool-result block.
    pub fn tool_result_success<S: Into<String>>(
        tool_use_id: S,
        content: ToolResultContent,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error: Some(false),
        }
    }

    /// Create a failed tool-result block carrying a diagnostic message.
    pub fn tool_result_error<S: Into<String>, M: Into<String>>(tool_use_id: S, message: M) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: ToolResultContent::text(message),
            is_error: Some(true),
        }
    }

    /// True if this is a text block.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// True if this is a tool-use block.
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }

    /// True if this is a tool-result block.
    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }

    /// The text payload, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Payload of a tool-result block.
///
/// Providers return either plain text or structured JSON; both are kept
/// as-is so the model sees exactly what the tool produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Json(serde_json::Value),
}

impl ToolResultContent {
    /// Wrap plain text.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text(text.into())
    }

    /// Wrap a JSON value.
    pub fn json(value: serde_json::Value) -> Self {
        Self::Json(value)
    }

    /// Render the payload as a display string for dialects that only accept
    /// text result content.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => {
                serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_constructors() {
        let block = ContentBlock::text("hello");
        assert!(block.is_text());
        assert_eq!(block.as_text(), Some("hello"));

        let block = ContentBlock::tool_use("call_1", "count_documents", json!({"collection": "t"}));
        assert!(block.is_tool_use());
        assert!(!block.is_text());
    }

    #[test]
    fn test_serde_wire_shape() {
        let block = ContentBlock::tool_use("call_1", "find_document_by_id", json!({"id": "x"}));
        let wire = serde_json::to_value(&block).unwrap();
        assert_eq!(wire["type"], "tool_use");
        assert_eq!(wire["id"], "call_1");
        assert_eq!(wire["name"], "find_document_by_id");

        let back: ContentBlock = serde_json::from_value(wire).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_tool_result_error_shape() {
        let block = ContentBlock::tool_result_error("call_9", "no such tool");
        match &block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "call_9");
                assert_eq!(content.to_display_string(), "no such tool");
                assert_eq!(*is_error, Some(true));
            }
            _ => panic!("expected tool result"),
        }
    }

    #[test]
    fn test_result_content_display() {
        let content = ToolResultContent::json(json!({"count": 3}));
        assert_eq!(content.to_display_string(), r#"{"count":3}"#);

        let content = ToolResultContent::text("plain");
        assert_eq!(content.to_display_string(), "plain");
    }
}
