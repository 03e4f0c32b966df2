//! Content accumulation for streamed responses.
//!
//! Converts one ordered sequence of stream events into a structured message.
//! Pure and synchronous: the engine feeds events in and observes immutable
//! snapshots; no I/O happens here.

use tracing::{debug, warn};

use crate::error::{Result, TachiError};
use crate::types::{
    BlockKind, ChatMessage, ContentBlock, DeltaPayload, ReasoningContent, RedactedReasoningContent,
    StopReason, StreamEvent, ToolUseContent,
};

/// A finalized turn: the assembled message plus its stop reason.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub message: ChatMessage,
    pub stop_reason: StopReason,
}

#[derive(Debug)]
enum ReasoningBuf {
    Visible {
        text: String,
        signature: String,
        finished: bool,
    },
    Redacted {
        data: String,
    },
}

#[derive(Debug)]
struct ToolBuf {
    call_id: String,
    name: String,
    input_json: String,
}

/// Accumulates one in-progress message from stream events.
///
/// Argument text for a tool invocation accumulates separately from any
/// concurrently streaming plain text; a response may interleave both.
#[derive(Debug, Default)]
pub struct ContentAccumulator {
    message: Option<ChatMessage>,
    text_buf: String,
    reasoning: Option<ReasoningBuf>,
    tool: Option<ToolBuf>,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a turn has started and not yet finalized.
    pub fn in_progress(&self) -> bool {
        self.message.is_some()
    }

    /// Immutable snapshot of the in-progress message, including buffered
    /// reasoning and text that have not reached a block boundary yet.
    /// Partially streamed tool arguments are not renderable and are left
    /// out. Returns `None` before the turn starts.
    pub fn snapshot(&self) -> Option<ChatMessage> {
        let mut message = self.message.clone()?;
        if let Some(block) = self.reasoning_block() {
            message.content.push(block);
        }
        if !self.text_buf.is_empty() {
            message.content.push(ContentBlock::Text {
                text: self.text_buf.clone(),
            });
        }
        Some(message)
    }

    /// Consume one event. Returns the finalized turn on `TurnStop`.
    ///
    /// A `TurnStop` without a preceding `TurnStart` is a malformed stream;
    /// the caller should discard this pass and re-issue the same request.
    pub fn push(&mut self, event: StreamEvent) -> Result<Option<TurnOutcome>> {
        match event {
            StreamEvent::TurnStart { role } => {
                if self.message.is_some() {
                    debug!("turn start while a turn is open; discarding partial");
                }
                self.reset();
                self.message = Some(ChatMessage::empty(role));
                Ok(None)
            }
            StreamEvent::BlockStart { block } => {
                if self.message.is_none() {
                    warn!("block start before turn start; dropping");
                    return Ok(None);
                }
                // An unstopped previous block is closed implicitly.
                self.close_open_block();
                match block {
                    BlockKind::Text => {}
                    BlockKind::Reasoning => {
                        self.reasoning = Some(ReasoningBuf::Visible {
                            text: String::new(),
                            signature: String::new(),
                            finished: false,
                        });
                    }
                    BlockKind::RedactedReasoning => {
                        self.reasoning = Some(ReasoningBuf::Redacted {
                            data: String::new(),
                        });
                    }
                    BlockKind::ToolUse { call_id, name } => {
                        self.tool = Some(ToolBuf {
                            call_id,
                            name,
                            input_json: String::new(),
                        });
                    }
                }
                Ok(None)
            }
            StreamEvent::BlockDelta { delta } => {
                if self.message.is_none() {
                    warn!("block delta before turn start; dropping");
                    return Ok(None);
                }
                self.apply_delta(delta);
                Ok(None)
            }
            StreamEvent::BlockStop => {
                self.close_open_block();
                Ok(None)
            }
            StreamEvent::TurnStop { stop_reason } => {
                let Some(mut message) = self.message.take() else {
                    return Err(TachiError::MalformedStream(
                        "turn terminator without a turn start".to_string(),
                    ));
                };
                // Flush anything the stream left unstopped.
                self.flush_into(&mut message.content);
                self.reset();
                Ok(Some(TurnOutcome {
                    message,
                    stop_reason,
                }))
            }
            // Trailing accounting is the engine's concern, not content.
            StreamEvent::ResponseMetadata { .. } => Ok(None),
        }
    }

    fn apply_delta(&mut self, delta: DeltaPayload) {
        match delta {
            DeltaPayload::Text { text } => self.text_buf.push_str(&text),
            DeltaPayload::Reasoning { text } => match &mut self.reasoning {
                Some(ReasoningBuf::Visible { text: buf, finished, .. }) => {
                    if *finished {
                        debug!("reasoning delta after signature; dropping");
                    } else {
                        buf.push_str(&text);
                    }
                }
                Some(ReasoningBuf::Redacted { .. }) => {
                    warn!("visible reasoning delta inside redacted block; dropping");
                }
                None => {
                    self.reasoning = Some(ReasoningBuf::Visible {
                        text,
                        signature: String::new(),
                        finished: false,
                    });
                }
            },
            DeltaPayload::ReasoningSignature { signature } => {
                if let Some(ReasoningBuf::Visible {
                    signature: sig,
                    finished,
                    ..
                }) = &mut self.reasoning
                {
                    sig.push_str(&signature);
                    if !sig.is_empty() {
                        *finished = true;
                    }
                }
            }
            DeltaPayload::RedactedReasoning { data } => match &mut self.reasoning {
                Some(ReasoningBuf::Redacted { data: buf }) => buf.push_str(&data),
                _ => {
                    self.reasoning = Some(ReasoningBuf::Redacted { data });
                }
            },
            DeltaPayload::ToolInput { partial_json } => match &mut self.tool {
                Some(tool) => tool.input_json.push_str(&partial_json),
                None => warn!("tool input delta without an open tool block; dropping"),
            },
        }
    }

    /// Finalize whichever block is open, pushing completed content blocks.
    fn close_open_block(&mut self) {
        if let Some(tool) = self.tool.take() {
            let input = parse_tool_input(tool.input_json);
            if let Some(message) = &mut self.message {
                message.content.push(ContentBlock::ToolUse(ToolUseContent {
                    call_id: tool.call_id,
                    name: tool.name,
                    input,
                }));
            }
            return;
        }
        let mut flushed = Vec::new();
        self.flush_into(&mut flushed);
        if let Some(message) = &mut self.message {
            message.content.extend(flushed);
        }
    }

    /// Flush buffered reasoning and text. Reasoning always precedes the text
    /// it informed.
    fn flush_into(&mut self, out: &mut Vec<ContentBlock>) {
        if let Some(block) = self.reasoning_block() {
            out.push(block);
        }
        self.reasoning = None;
        if !self.text_buf.is_empty() {
            out.push(ContentBlock::Text {
                text: std::mem::take(&mut self.text_buf),
            });
        }
        if let Some(tool) = self.tool.take() {
            out.push(ContentBlock::ToolUse(ToolUseContent {
                call_id: tool.call_id,
                name: tool.name,
                input: parse_tool_input(tool.input_json),
            }));
        }
    }

    fn reasoning_block(&self) -> Option<ContentBlock> {
        match self.reasoning.as_ref()? {
            ReasoningBuf::Visible { text, signature, .. } => {
                if text.is_empty() && signature.is_empty() {
                    None
                } else {
                    Some(ContentBlock::Reasoning(ReasoningContent {
                        text: text.clone(),
                        signature: signature.clone(),
                    }))
                }
            }
            ReasoningBuf::Redacted { data } => {
                if data.is_empty() {
                    None
                } else {
                    Some(ContentBlock::RedactedReasoning(RedactedReasoningContent {
                        data: data.clone(),
                    }))
                }
            }
        }
    }

    fn reset(&mut self) {
        self.message = None;
        self.text_buf.clear();
        self.reasoning = None;
        self.tool = None;
    }
}

/// Best-effort parse: invalid JSON keeps the raw string rather than failing.
fn parse_tool_input(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}
