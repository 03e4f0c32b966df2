//! Shared test helpers: scripted feed, recording invoker, canned turns.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use tachi::error::{Result, TachiError};
use tachi::tools::ToolInvoker;
use tachi::transport::{EventFeed, EventStream};
use tachi::types::*;

pub const CLAUDE: &str = "claude-sonnet-4-20250514";

/// A feed that replays canned event scripts, one per `open` call, and
/// records every request it saw.
pub struct ScriptedFeed {
    scripts: Mutex<VecDeque<Vec<Result<StreamEvent>>>>,
    requests: Mutex<Vec<ChatRequest>>,
    /// Keep the stream open (pending) after the script runs out.
    hang_after_script: bool,
}

impl ScriptedFeed {
    pub fn new(scripts: Vec<Vec<Result<StreamEvent>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            hang_after_script: false,
        }
    }

    /// After replaying its events, the stream stays open forever instead of
    /// ending. For cancellation-while-streaming tests.
    pub fn hanging(mut self) -> Self {
        self.hang_after_script = true;
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventFeed for ScriptedFeed {
    async fn open(&self, request: &ChatRequest) -> Result<EventStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TachiError::Stream("no scripted response left".to_string()))?;
        let stream = futures::stream::iter(script);
        if self.hang_after_script {
            Ok(Box::pin(stream.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(stream))
        }
    }
}

/// An invoker that records calls and pops canned responses.
pub struct RecordingInvoker {
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
    responses: Mutex<VecDeque<Result<serde_json::Value>>>,
    delay: Option<Duration>,
}

impl RecordingInvoker {
    pub fn new(responses: Vec<Result<serde_json::Value>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into()),
            delay: None,
        }
    }

    /// Sleep before answering, so a test can cancel mid-execution.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ToolInvoker for RecordingInvoker {
    async fn invoke(&self, name: &str, input: &serde_json::Value) -> Result<serde_json::Value> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), input.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(serde_json::json!("ok")))
    }
}

/// A plain text response turn with trailing metadata.
pub fn text_turn(text: &str) -> Vec<Result<StreamEvent>> {
    vec![
        Ok(StreamEvent::TurnStart {
            role: Role::Assistant,
        }),
        Ok(StreamEvent::BlockStart {
            block: BlockKind::Text,
        }),
        Ok(StreamEvent::BlockDelta {
            delta: DeltaPayload::Text {
                text: text.to_string(),
            },
        }),
        Ok(StreamEvent::BlockStop),
        Ok(StreamEvent::TurnStop {
            stop_reason: StopReason::EndTurn,
        }),
        Ok(StreamEvent::ResponseMetadata {
            metadata: ResponseMetadata {
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                    ..Default::default()
                },
                model_id: Some(CLAUDE.to_string()),
                finished_at: None,
            },
        }),
    ]
}

/// A turn requesting the given tool calls, arguments streamed as JSON text.
pub fn tool_turn(calls: &[(&str, &str, &str)]) -> Vec<Result<StreamEvent>> {
    let mut events: Vec<Result<StreamEvent>> = vec![Ok(StreamEvent::TurnStart {
        role: Role::Assistant,
    })];
    for (call_id, name, args) in calls {
        events.push(Ok(StreamEvent::BlockStart {
            block: BlockKind::ToolUse {
                call_id: call_id.to_string(),
                name: name.to_string(),
            },
        }));
        events.push(Ok(StreamEvent::BlockDelta {
            delta: DeltaPayload::ToolInput {
                partial_json: args.to_string(),
            },
        }));
        events.push(Ok(StreamEvent::BlockStop));
    }
    events.push(Ok(StreamEvent::TurnStop {
        stop_reason: StopReason::ToolUse,
    }));
    events.push(Ok(StreamEvent::ResponseMetadata {
        metadata: ResponseMetadata {
            usage: Usage {
                input_tokens: 20,
                output_tokens: 8,
                total_tokens: 28,
                ..Default::default()
            },
            model_id: Some(CLAUDE.to_string()),
            finished_at: None,
        },
    }));
    events
}

/// Check the pairing invariant over a finalized history: every tool use has
/// exactly one result in a strictly later message, and vice versa.
pub fn pairing_holds(history: &[ChatMessage]) -> bool {
    for (idx, message) in history.iter().enumerate() {
        for tu in message.tool_uses() {
            let matches = history[idx + 1..]
                .iter()
                .flat_map(|m| m.tool_results())
                .filter(|tr| tr.call_id == tu.call_id)
                .count();
            if matches != 1 {
                return false;
            }
        }
        for tr in message.tool_results() {
            let matches = history[..idx]
                .iter()
                .flat_map(|m| m.tool_uses())
                .filter(|tu| tu.call_id == tr.call_id)
                .count();
            if matches != 1 {
                return false;
            }
        }
    }
    true
}
