//! Convenience re-exports for common usage.

pub use crate::accumulator::{ContentAccumulator, TurnOutcome};
pub use crate::cache::{CachePlan, CachePointPlanner};
pub use crate::engine::{
    CancelHandle, ConversationEngine, EngineConfig, EngineEvent, EngineState, SessionManager,
    TurnReport, TurnStatus, UserInput,
};
pub use crate::error::{Result, TachiError};
pub use crate::models::{capabilities_for, ModelCapabilities};
pub use crate::moderation::{
    ContentModerator, ModerationDirection, ModerationPolicy, ModerationVerdict,
};
pub use crate::persist::{MemorySink, PersistenceSink};
pub use crate::tools::{FnInvoker, ToolDefinition, ToolInvoker};
pub use crate::transport::{EventFeed, EventStream, SseEventFeed};
pub use crate::types::*;
