//! Message and content-block types for a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::ResponseMetadata;

/// A message in a conversation.
///
/// Ordering within a conversation is significant and append-only once
/// finalized; only the most recent assistant message is mutated in place
/// while a response streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    /// Usage/accounting data, attached after the stream completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Create a user message with plain text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            metadata: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a user message from arbitrary content blocks.
    pub fn user_with_content(content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content,
            metadata: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create an assistant message with plain text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            metadata: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create an empty message for a role whose content streams in.
    pub fn empty(role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: Vec::new(),
            metadata: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract the text content, concatenating all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool invocations requested by this message, in emission order.
    pub fn tool_uses(&self) -> Vec<&ToolUseContent> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tu) => Some(tu),
                _ => None,
            })
            .collect()
    }

    /// Tool results carried by this message, in order.
    pub fn tool_results(&self) -> Vec<&ToolResultContent> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult(tr) => Some(tr),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse(_)))
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One typed unit of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Reasoning(ReasoningContent),
    RedactedReasoning(RedactedReasoningContent),
    ToolUse(ToolUseContent),
    ToolResult(ToolResultContent),
    Image(ImageContent),
}

/// The model's private deliberation, with a provider signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningContent {
    pub text: String,
    pub signature: String,
}

/// Deliberation the provider returned only in opaque form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedactedReasoningContent {
    pub data: String,
}

/// A tool invocation requested by the model.
///
/// `input` is best-effort: if the streamed argument text was not valid JSON
/// at block close, the raw string is kept (`Value::String`) instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseContent {
    pub call_id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Outcome of one tool invocation, paired to a `ToolUse` by call id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultContent {
    pub call_id: String,
    pub content: Vec<ToolResultPart>,
    pub status: ToolResultStatus,
}

impl ToolResultContent {
    /// Build a success result from a serializable tool output.
    pub fn success(call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            content: vec![ToolResultPart::from_value(output)],
            status: ToolResultStatus::Success,
        }
    }

    /// Build an error result carrying a failure description.
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: vec![ToolResultPart::Text {
                text: message.into(),
            }],
            status: ToolResultStatus::Error,
        }
    }

    /// Concatenated text rendering of the result content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ToolResultPart::Text { text } => text.clone(),
                ToolResultPart::Data { value } => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Tool output is either plain text or structured data, never sniffed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultPart {
    Text { text: String },
    Data { value: serde_json::Value },
}

impl ToolResultPart {
    /// Wrap a tool's output value: strings stay text, the rest is data.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text { text },
            other => Self::Data { value: other },
        }
    }
}

/// Status of a tool result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// Image content embedded in a message (base64 payload).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    pub data: String,
    pub mime_type: String,
}
