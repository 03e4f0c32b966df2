//! Outgoing request shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::ChatMessage;
use crate::tools::ToolDefinition;

/// One request to the inference API.
///
/// Cache markers are out-of-band annotations produced by the cache planner;
/// they never alter message content, only tell the transport where a
/// reusable prefix ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: Uuid,
    pub model_id: String,
    /// Context-length-limited history for this request.
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<CacheableText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCatalog>,
    /// Index into `messages` after which no reusable prefix extends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_cache_boundary: Option<usize>,
}

/// A system prompt that may carry a cache marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheableText {
    pub text: String,
    #[serde(default)]
    pub cache_point: bool,
}

impl CacheableText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache_point: false,
        }
    }
}

/// The advertised tool catalog, which may carry a cache marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCatalog {
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub cache_point: bool,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        Self {
            tools,
            cache_point: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
