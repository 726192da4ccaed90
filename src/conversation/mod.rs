//! Conversation-history bounds.
//!
//! The transcript is kept inside a fixed turn bound by a sliding window:
//! once the history exceeds [`WindowConfig::max_turns`], only the most
//! recent [`WindowConfig::retain_turns`] are kept before the next user turn
//! is appended. The window never cuts blindly. The truncation point is
//! moved backward (retaining more) until it lands on a user turn that splits
//! no tool-use/tool-result pair, because a transcript whose result turns
//! reference requests the model can no longer see is rejected by every
//! backend dialect.
//!
//! # Usage
//!
//! ```rust
//! use docent::conversation::SlidingWindow;
//! use docent::types::{Transcript, Turn};
//!
//! let window = SlidingWindow::with_defaults();
//! let mut transcript = Transcript::new();
//! for i in 0..12 {
//!     transcript.push(Turn::user(format!("message {i}")));
//! }
//! let outcome = window.apply(&mut transcript);
//! assert_eq!(transcript.len(), 9);
//! assert_eq!(outcome.removed, 3);
//! ```

use std::collections::HashSet;

use crate::types::{ContentBlock, Transcript, TurnRole};
use crate::{DocentError, Result};

/// Window sizing.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Truncation triggers when the transcript grows beyond this many turns.
    pub max_turns: usize,
    /// Turns retained when truncation triggers (before the new user turn is
    /// appended).
    pub retain_turns: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            retain_turns: 9,
        }
    }
}

/// What one application of the window did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Turns dropped from the front of the transcript.
    pub removed: usize,
    /// How many extra turns were retained beyond the configured count to
    /// reach a safe boundary.
    pub widened_by: usize,
}

/// Pair-safe sliding window over a [`Transcript`].
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    config: WindowConfig,
}

impl SlidingWindow {
    /// Create a window with validated sizing.
    pub fn new(config: WindowConfig) -> Result<Self> {
        if config.retain_turns == 0 {
            return Err(DocentError::configuration(
                "window must retain at least one turn",
            ));
        }
        if config.retain_turns > config.max_turns {
            return Err(DocentError::configuration(format!(
                "retain_turns ({}) must not exceed max_turns ({})",
                config.retain_turns, config.max_turns
            )));
        }
        Ok(Self { config })
    }

    /// Create a window with the default 10-turn bound.
    pub fn with_defaults() -> Self {
        Self {
            config: WindowConfig::default(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Enforce the bound on `transcript`. Called by the orchestration loop
    /// immediately before appending a new user turn.
    pub fn apply(&self, transcript: &mut Transcript) -> WindowOutcome {
        if transcript.len() <= self.config.max_turns {
            return WindowOutcome::default();
        }

        let desired = transcript.len() - self.config.retain_turns;
        let start = Self::find_safe_start(transcript, desired);
        transcript.drain_front(start);

        WindowOutcome {
            removed: start,
            widened_by: desired - start,
        }
    }

    /// Largest index `<= desired` that is a safe truncation point: the turn
    /// at the index is a user turn and no retained tool-result references a
    /// tool-use before the index. Returns 0 (retain everything) when no
    /// safe point exists.
    fn find_safe_start(transcript: &Transcript, desired: usize) -> usize {
        (0..=desired)
            .rev()
            .find(|&start| Self::is_safe_boundary(transcript, start))
            .unwrap_or(0)
    }

    fn is_safe_boundary(transcript: &Transcript, start: usize) -> bool {
        if start == 0 {
            return true;
        }
        if transcript[start].role != TurnRole::User {
            return false;
        }
        // Tool uses precede their results in any well-formed transcript, so
        // a single forward pass catches every orphaned result.
        let mut retained_uses: HashSet<&str> = HashSet::new();
        for turn in &transcript.turns()[start..] {
            for id in turn.tool_use_ids() {
                retained_uses.insert(id);
            }
            for id in turn.tool_result_ids() {
                if !retained_uses.contains(id) {
                    return false;
                }
            }
        }
        true
    }

    /// Repair pass for a transcript that arrives already corrupted: drops
    /// tool-result turns whose request is gone and strips tool-use blocks
    /// that never received a result. Returns the number of turns and blocks
    /// removed. The window policy itself never produces such transcripts.
    pub fn remove_dangling(transcript: &mut Transcript) -> usize {
        let use_ids: HashSet<String> = transcript
            .iter()
            .flat_map(|turn| turn.tool_use_ids())
            .map(str::to_string)
            .collect();
        let result_ids: HashSet<String> = transcript
            .iter()
            .flat_map(|turn| turn.tool_result_ids())
            .map(str::to_string)
            .collect();

        let mut removed = 0;

        let mut repaired = Vec::with_capacity(transcript.len());
        for turn in transcript.iter() {
            let mut turn = turn.clone();
            let before = turn.content.len();
            turn.content.retain(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => use_ids.contains(tool_use_id),
                ContentBlock::ToolUse { id, .. } => result_ids.contains(id),
                _ => true,
            });
            removed += before - turn.content.len();
            if !turn.content.is_empty() {
                repaired.push(turn);
            } else {
                removed += 1;
            }
        }
        *transcript = Transcript::from(repaired);

        removed
    }
}
