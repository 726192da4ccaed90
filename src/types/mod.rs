//! Core data types for conversation transcripts.
//!
//! A conversation is an ordered [`Transcript`] of [`Turn`]s; every turn
//! carries one or more [`ContentBlock`]s. The shapes here mirror the model
//! wire protocol (text / tool_use / tool_result blocks) so a transcript can
//! be replayed to the model backend without information loss.

pub mod content;
pub mod messages;

pub use content::{ContentBlock, ToolResultContent};
pub use messages::{Transcript, Turn, TurnRole};
