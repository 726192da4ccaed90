//! Turns and transcripts.
//!
//! A [`Turn`] is one transcript entry: who spoke ([`TurnRole`]) and the
//! ordered content blocks they produced. A [`Transcript`] is the bounded
//! conversation history the orchestration loop mutates and the gateway
//! replays to the model.
//!
//! Tool results are their own role rather than a flavor of user turn: the
//! window policy needs to tell them apart, and each gateway dialect maps
//! them onto whatever role its wire format requires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::ContentBlock;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    ToolResult,
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// Unique identifier for this turn.
    pub id: Uuid,
    /// Who produced the turn.
    pub role: TurnRole,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
    /// When the turn was appended.
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a turn with the given role and content.
    pub fn new(role: TurnRole, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn from plain text.
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(TurnRole::User, vec![ContentBlock::text(text)])
    }

    /// Create an assistant turn from the model's content blocks, order
    /// preserved.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Create a tool-result turn carrying a single result block.
    pub fn tool_result(block: ContentBlock) -> Self {
        Self::new(TurnRole::ToolResult, vec![block])
    }

    /// True if any block in this turn is a tool-use request.
    pub fn has_tool_use(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_use)
    }

    /// Call identifiers of every tool-use block in this turn, in order.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Call identifiers referenced by tool-result blocks in this turn.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All text block payloads in this turn, joined with newlines. `None`
    /// if the turn carries no text.
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

/// An ordered conversation history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True if the transcript has no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent turn, if any.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Borrow the turns.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Remove the turns before `index`, keeping `index..`.
    pub fn drain_front(&mut self, index: usize) {
        if index > 0 && index <= self.turns.len() {
            self.turns.drain(..index);
        }
    }

    /// Remove and return the most recent turn.
    pub fn pop(&mut self) -> Option<Turn> {
        self.turns.pop()
    }

    /// Retain only turns matching the predicate.
    pub fn retain<F: FnMut(&Turn) -> bool>(&mut self, f: F) {
        self.turns.retain(f);
    }
}

impl std::ops::Deref for Transcript {
    type Target = Vec<Turn>;

    fn deref(&self) -> &Self::Target {
        &self.turns
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
