//! Stream event types.
//!
//! The inference transport delivers one ordered sequence of these events per
//! response turn, terminated by `TurnStop` (optionally followed by a trailing
//! `ResponseMetadata`) or by a transport error.

use serde::{Deserialize, Serialize};

use super::message::Role;
use super::usage::ResponseMetadata;

/// A discriminated event from the inference stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A response turn begins for the given role.
    TurnStart { role: Role },
    /// A new content block opens.
    BlockStart { block: BlockKind },
    /// Incremental content for the open block.
    BlockDelta { delta: DeltaPayload },
    /// The open block is complete.
    BlockStop,
    /// The turn is complete.
    TurnStop { stop_reason: StopReason },
    /// Trailing usage/accounting data for the finished turn.
    ResponseMetadata { metadata: ResponseMetadata },
}

/// The kind of content block being opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Reasoning,
    RedactedReasoning,
    ToolUse { call_id: String, name: String },
}

/// Incremental payload within a block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaPayload {
    /// Plain text for the visible message.
    Text { text: String },
    /// Reasoning text, accumulated separately from visible text.
    Reasoning { text: String },
    /// Opaque signature; once non-empty the reasoning block is finished.
    ReasoningSignature { signature: String },
    /// Opaque bytes for a redacted reasoning block.
    RedactedReasoning { data: String },
    /// Raw tool-argument text, keyed by the open tool block's call id.
    ToolInput { partial_json: String },
}

/// Terminal classification of one streamed turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    /// Whether the model stopped to have tools invoked.
    pub fn wants_tools(&self) -> bool {
        matches!(self, Self::ToolUse)
    }
}
