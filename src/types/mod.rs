//! Core types shared across the engine.

pub mod message;
pub mod request;
pub mod stream;
pub mod usage;

pub use message::{
    ChatMessage, ContentBlock, ImageContent, ReasoningContent, RedactedReasoningContent, Role,
    ToolResultContent, ToolResultPart, ToolResultStatus, ToolUseContent,
};
pub use request::{CacheableText, ChatRequest, ToolCatalog};
pub use stream::{BlockKind, DeltaPayload, StopReason, StreamEvent};
pub use usage::{ResponseMetadata, Usage};
