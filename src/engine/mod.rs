//! Conversation orchestration engine.
//!
//! Drives one logical conversation: send a request, accumulate the streamed
//! response, execute any requested tools, feed results back, and repeat
//! until the model produces a final answer or the caller cancels. The
//! recursion is an explicit bounded loop; cancellation is a flag check
//! between suspension points, not an unwound exception.

pub mod session;

pub use session::SessionManager;

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::accumulator::{ContentAccumulator, TurnOutcome};
use crate::cache::{CachePlan, CachePointPlanner};
use crate::error::{Result, TachiError};
use crate::moderation::{ContentModerator, ModerationDirection, ModerationPolicy};
use crate::persist::PersistenceSink;
use crate::tools::{ToolDefinition, ToolInvoker};
use crate::transport::EventFeed;
use crate::types::{
    CacheableText, ChatMessage, ChatRequest, ContentBlock, DeltaPayload, ImageContent,
    ResponseMetadata, StreamEvent, ToolCatalog, ToolResultContent, ToolResultPart,
    ToolResultStatus, ToolUseContent, Usage,
};

const DEFAULT_MAX_TURNS: usize = 20;
const DEFAULT_CONTEXT_WINDOW_MESSAGES: usize = 100;

/// Engine configuration for one conversation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_id: String,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
    /// Circuit breaker for the tool loop.
    pub max_turns: usize,
    /// Context-length limit applied to the history sent per request.
    pub context_window_messages: usize,
    pub cache_enabled: bool,
    pub moderation: ModerationPolicy,
}

impl EngineConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_prompt: None,
            tools: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
            context_window_messages: DEFAULT_CONTEXT_WINDOW_MESSAGES,
            cache_enabled: true,
            moderation: ModerationPolicy::default(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_moderation(mut self, policy: ModerationPolicy) -> Self {
        self.moderation = policy;
        self
    }
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Sending,
    Streaming,
    ToolsRequested,
    ExecutingTools,
    Aborted,
    Errored,
}

/// Observer events published while a turn runs.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged { state: EngineState },
    /// Immutable snapshot of the in-progress assistant message.
    PartialAssistant { snapshot: ChatMessage },
    ToolCallStarted { call: ToolUseContent },
    ToolCallCompleted { result: ToolResultContent },
    /// Moderation replaced content; `call_id` is `None` for user input.
    ModerationIntervened { call_id: Option<String> },
    TurnCompleted { message: ChatMessage },
}

/// Callback for observer events.
pub type EngineEventSink = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// User input for one submission.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub text: String,
    pub images: Vec<ImageContent>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: ImageContent) -> Self {
        self.images.push(image);
        self
    }
}

/// Terminal status of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Cancelled,
}

/// Result of one submission.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub status: TurnStatus,
    /// The final assistant message, absent when cancelled.
    pub final_message: Option<ChatMessage>,
    /// Model turns consumed, including tool round trips.
    pub turns: usize,
    /// Aggregated usage across all turns of this submission.
    pub usage: Usage,
}

/// Cancels an in-flight submission from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

enum StreamedTurn {
    Completed {
        outcome: TurnOutcome,
        metadata: Option<ResponseMetadata>,
    },
    Cancelled,
}

/// Orchestrates one conversation against an inference stream.
///
/// The history is exclusively owned here; observers get snapshots. Each
/// conversation owns its engine and its cache planner — concurrent
/// conversations must not share either.
pub struct ConversationEngine {
    conversation_id: Uuid,
    config: EngineConfig,
    feed: Arc<dyn EventFeed>,
    invoker: Arc<dyn ToolInvoker>,
    sink: Arc<dyn PersistenceSink>,
    moderator: Option<Arc<dyn ContentModerator>>,
    event_sink: Option<EngineEventSink>,
    planner: CachePointPlanner,
    history: Vec<ChatMessage>,
    state: EngineState,
    cancel: CancellationToken,
}

impl ConversationEngine {
    pub fn new(
        config: EngineConfig,
        feed: Arc<dyn EventFeed>,
        invoker: Arc<dyn ToolInvoker>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            conversation_id: Uuid::new_v4(),
            config,
            feed,
            invoker,
            sink,
            moderator: None,
            event_sink: None,
            planner: CachePointPlanner::new(),
            history: Vec::new(),
            state: EngineState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_moderator(mut self, moderator: Arc<dyn ContentModerator>) -> Self {
        self.moderator = Some(moderator);
        self
    }

    pub fn with_event_sink(mut self, sink: EngineEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Snapshot of the conversation history.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.clone()
    }

    /// Handle for cancelling the current (or next) submission.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
        }
    }

    /// Drop all conversation state, including the cache boundary.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.planner.reset();
    }

    /// Switch models; the carried cache boundary does not survive a switch.
    pub fn set_model(&mut self, model_id: impl Into<String>) {
        self.config.model_id = model_id.into();
        self.planner.reset();
    }

    /// Submit user input and drive the conversation to its next resting
    /// state. Returns when the model produces a final answer, the caller
    /// cancels, or a fatal error occurs.
    pub async fn submit(&mut self, input: UserInput) -> Result<TurnReport> {
        if self.state != EngineState::Idle {
            return Err(TachiError::InvalidState(
                "submit while a turn is already active".to_string(),
            ));
        }
        if self.cancel.is_cancelled() {
            // Stale cancellation from before this submission.
            self.cancel = CancellationToken::new();
        }
        let cancel = self.cancel.clone();

        let user_message = self.build_user_message(input).await?;
        self.append_and_persist(user_message).await?;

        let mut turns = 0usize;
        let mut usage = Usage::default();

        loop {
            turns += 1;
            if turns > self.config.max_turns {
                warn!(limit = self.config.max_turns, "tool loop exceeded max turns");
                self.set_state(EngineState::Errored);
                self.set_state(EngineState::Idle);
                return Err(TachiError::TurnLimitExceeded {
                    limit: self.config.max_turns,
                });
            }
            if cancel.is_cancelled() {
                return self.cancelled(turns, usage).await;
            }

            self.set_state(EngineState::Sending);
            let request = self.build_request();

            let streamed = match self.stream_turn(&request, &cancel).await {
                Ok(streamed) => streamed,
                Err(err) => {
                    self.surface_transport_error(&err).await;
                    return Err(err);
                }
            };
            let (outcome, metadata) = match streamed {
                StreamedTurn::Completed { outcome, metadata } => (outcome, metadata),
                StreamedTurn::Cancelled => return self.cancelled(turns, usage).await,
            };

            let message_id = outcome.message.id;
            let wants_tools = outcome.stop_reason.wants_tools() && outcome.message.has_tool_use();
            self.history.push(outcome.message);
            if let Some(metadata) = metadata {
                usage.merge(&metadata.usage);
                self.attach_metadata(message_id, metadata);
            }
            let assistant = self
                .history
                .iter()
                .rfind(|m| m.id == message_id)
                .cloned()
                .unwrap_or_else(|| ChatMessage::empty(crate::types::Role::Assistant));
            self.sink.append(self.conversation_id, &assistant).await?;

            if !wants_tools {
                self.set_state(EngineState::Idle);
                self.emit(EngineEvent::TurnCompleted {
                    message: assistant.clone(),
                });
                return Ok(TurnReport {
                    status: TurnStatus::Completed,
                    final_message: Some(assistant),
                    turns,
                    usage,
                });
            }

            self.set_state(EngineState::ToolsRequested);
            let calls: Vec<ToolUseContent> =
                assistant.tool_uses().into_iter().cloned().collect();
            self.set_state(EngineState::ExecutingTools);

            // Tools run strictly sequentially: result order in the follow-up
            // message must match the order the tools were requested in.
            let mut results: Vec<ContentBlock> = Vec::with_capacity(calls.len());
            for call in &calls {
                if cancel.is_cancelled() {
                    return self.cancelled(turns, usage).await;
                }
                self.emit(EngineEvent::ToolCallStarted { call: call.clone() });
                debug!(tool = %call.name, call_id = %call.call_id, "invoking tool");
                // Abandon (don't await) the in-flight call on cancellation.
                let invoked = tokio::select! {
                    _ = cancel.cancelled() => None,
                    invoked = self.invoker.invoke(&call.name, &call.input) => Some(invoked),
                };
                let Some(invoked) = invoked else {
                    return self.cancelled(turns, usage).await;
                };
                let result = match invoked {
                    Ok(value) => ToolResultContent::success(&call.call_id, value),
                    Err(err) => {
                        warn!(tool = %call.name, error = %err, "tool invocation failed");
                        ToolResultContent::error(&call.call_id, err.to_string())
                    }
                };
                let result = self.moderate_tool_result(result).await;
                self.emit(EngineEvent::ToolCallCompleted {
                    result: result.clone(),
                });
                results.push(ContentBlock::ToolResult(result));
            }

            let results_message = ChatMessage::user_with_content(results);
            self.append_and_persist(results_message).await?;
        }
    }

    /// Open the stream and drive the accumulator to a finalized turn.
    ///
    /// A malformed stream (terminator without start) discards the partial
    /// result and re-issues the identical request, once.
    async fn stream_turn(
        &mut self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamedTurn> {
        let mut retried = false;
        'attempt: loop {
            let mut stream = tokio::select! {
                _ = cancel.cancelled() => return Ok(StreamedTurn::Cancelled),
                opened = self.feed.open(request) => opened?,
            };
            self.set_state(EngineState::Streaming);

            let mut acc = ContentAccumulator::new();
            let mut outcome: Option<TurnOutcome> = None;
            let mut metadata: Option<ResponseMetadata> = None;

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return Ok(StreamedTurn::Cancelled),
                    next = stream.next() => next,
                };
                let Some(event) = next else { break };
                let event = event?;

                if let StreamEvent::ResponseMetadata { metadata: m } = &event {
                    metadata = Some(m.clone());
                    continue;
                }

                let observable = matches!(
                    event,
                    StreamEvent::BlockDelta {
                        delta: DeltaPayload::Text { .. } | DeltaPayload::ToolInput { .. }
                    }
                );
                match acc.push(event) {
                    Ok(Some(done)) => outcome = Some(done),
                    Ok(None) => {
                        if observable {
                            if let Some(snapshot) = acc.snapshot() {
                                self.emit(EngineEvent::PartialAssistant { snapshot });
                            }
                        }
                    }
                    Err(TachiError::MalformedStream(reason)) if !retried => {
                        warn!(%reason, "malformed stream; re-issuing request");
                        retried = true;
                        self.set_state(EngineState::Sending);
                        continue 'attempt;
                    }
                    Err(err) => return Err(err),
                }
            }

            return match outcome {
                Some(outcome) => Ok(StreamedTurn::Completed { outcome, metadata }),
                None => Err(TachiError::Stream(
                    "stream ended before the turn terminator".to_string(),
                )),
            };
        }
    }

    async fn build_user_message(&mut self, input: UserInput) -> Result<ChatMessage> {
        let mut text = input.text;
        if self.config.moderation.user_input {
            if let Some(moderator) = self.moderator.clone() {
                let verdict = moderator
                    .check(&text, ModerationDirection::Input)
                    .await
                    .map_err(|e| TachiError::Moderation(e.to_string()))?;
                if verdict.intervened {
                    self.emit(EngineEvent::ModerationIntervened { call_id: None });
                    text = verdict.substitute.unwrap_or_default();
                }
            }
        }

        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
        for image in input.images {
            content.push(ContentBlock::Image(image));
        }
        if content.is_empty() {
            return Err(TachiError::InvalidArgument(
                "user input has no content".to_string(),
            ));
        }
        Ok(ChatMessage::user_with_content(content))
    }

    fn build_request(&mut self) -> ChatRequest {
        let messages = truncate_history(&self.history, self.config.context_window_messages);
        let plan = if self.config.cache_enabled {
            self.planner.plan(messages.len(), &self.config.model_id)
        } else {
            CachePlan::none()
        };
        let system = self.config.system_prompt.as_ref().map(|text| CacheableText {
            text: text.clone(),
            cache_point: plan.cache_system,
        });
        let tools = (!self.config.tools.is_empty()).then(|| ToolCatalog {
            tools: self.config.tools.clone(),
            cache_point: plan.cache_tools,
        });
        ChatRequest {
            conversation_id: self.conversation_id,
            model_id: self.config.model_id.clone(),
            messages,
            system,
            tools,
            message_cache_boundary: plan.message_boundary,
        }
    }

    async fn moderate_tool_result(&mut self, result: ToolResultContent) -> ToolResultContent {
        if !self.config.moderation.tool_output {
            return result;
        }
        let Some(moderator) = self.moderator.clone() else {
            return result;
        };
        let text = result.text();
        match moderator.check(&text, ModerationDirection::Output).await {
            Ok(verdict) if verdict.intervened => {
                self.emit(EngineEvent::ModerationIntervened {
                    call_id: Some(result.call_id.clone()),
                });
                ToolResultContent {
                    call_id: result.call_id,
                    content: vec![ToolResultPart::Text {
                        text: verdict
                            .substitute
                            .unwrap_or_else(|| "Content withheld by moderation policy".to_string()),
                    }],
                    status: ToolResultStatus::Error,
                }
            }
            Ok(_) => result,
            Err(err) => {
                // Fail closed: unreviewable output does not re-enter the
                // conversation.
                warn!(error = %err, "moderation check failed; withholding tool output");
                ToolResultContent::error(result.call_id, "moderation unavailable")
            }
        }
    }

    /// Surface a transport failure as a visible assistant message, so the
    /// user sees something rather than a silent stop.
    async fn surface_transport_error(&mut self, err: &TachiError) {
        let notice = ChatMessage::assistant(format!("The response stream failed: {err}"));
        if let Err(persist_err) = self.append_and_persist(notice).await {
            warn!(error = %persist_err, "failed to persist stream failure notice");
        }
        self.set_state(EngineState::Errored);
        self.set_state(EngineState::Idle);
    }

    async fn cancelled(&mut self, turns: usize, usage: Usage) -> Result<TurnReport> {
        self.set_state(EngineState::Aborted);
        self.repair_dangling_tool_uses().await;
        self.cancel = CancellationToken::new();
        self.set_state(EngineState::Idle);
        Ok(TurnReport {
            status: TurnStatus::Cancelled,
            final_message: None,
            turns,
            usage,
        })
    }

    /// Remove every message containing a `ToolUse` with no later
    /// `ToolResult`. Whole messages only: partial block removal would break
    /// message boundaries. Persisted copies get a compensating delete.
    async fn repair_dangling_tool_uses(&mut self) {
        let mut dangling: Vec<usize> = Vec::new();
        for (idx, message) in self.history.iter().enumerate() {
            let uses = message.tool_uses();
            if uses.is_empty() {
                continue;
            }
            let unpaired = uses.iter().any(|tu| {
                !self.history[idx + 1..].iter().any(|later| {
                    later
                        .tool_results()
                        .iter()
                        .any(|tr| tr.call_id == tu.call_id)
                })
            });
            if unpaired {
                dangling.push(idx);
            }
        }
        for idx in dangling.into_iter().rev() {
            let removed = self.history.remove(idx);
            debug!(message_id = %removed.id, "removing message with unpaired tool use");
            if let Err(err) = self.sink.delete(self.conversation_id, idx).await {
                warn!(error = %err, "compensating delete failed");
            }
        }
    }

    fn attach_metadata(&mut self, message_id: Uuid, metadata: ResponseMetadata) {
        // By id, not position: other messages may have been appended since.
        match self.history.iter_mut().rfind(|m| m.id == message_id) {
            Some(message) => message.metadata = Some(metadata),
            None => debug!(%message_id, "metadata for a message no longer in history"),
        }
    }

    async fn append_and_persist(&mut self, message: ChatMessage) -> Result<()> {
        self.sink.append(self.conversation_id, &message).await?;
        self.history.push(message);
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "engine state");
            self.state = state;
            self.emit(EngineEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.event_sink {
            (sink)(event);
        }
    }
}

/// Tail window over the history, adjusted so the window never begins with
/// tool results whose matching tool use fell outside it.
fn truncate_history(history: &[ChatMessage], limit: usize) -> Vec<ChatMessage> {
    if history.len() <= limit {
        return history.to_vec();
    }
    let mut start = history.len() - limit;
    while start < history.len() && !history[start].tool_results().is_empty() {
        start += 1;
    }
    history[start..].to_vec()
}
