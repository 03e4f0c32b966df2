//! SSE transport for the messages wire protocol.
//!
//! Posts a request as JSON and decodes the chunked SSE response into
//! `StreamEvent`s. Cache markers from the planner serialize as
//! `cache_control` annotations on the marked elements.

use std::sync::OnceLock;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use crate::error::{Result, TachiError};
use crate::types::{
    BlockKind, ChatRequest, ContentBlock, DeltaPayload, ResponseMetadata, Role, StopReason,
    StreamEvent, Usage,
};

use super::{status_to_error, EventFeed, EventStream};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// HTTP event feed speaking the SSE messages protocol.
pub struct SseEventFeed {
    base_url: String,
    api_key: String,
    max_tokens: u32,
}

impl SseEventFeed {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Build from `TACHI_API_KEY` / `TACHI_BASE_URL` (loads `.env` if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = std::env::var("TACHI_API_KEY")
            .map_err(|_| TachiError::Configuration("TACHI_API_KEY is not set".to_string()))?;
        let base_url =
            std::env::var("TACHI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(base_url, api_key))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(val) = HeaderValue::from_str(&self.api_key) {
            headers.insert("x-api-key", val);
        }
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.messages.len());
        for msg in &request.messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(serde_json::json!({
                "role": role,
                "content": build_wire_content(&msg.content),
            }));
        }

        // The boundary marker lands on the last content element of the
        // marked message; everything before it is the reusable prefix.
        if let Some(boundary) = request.message_cache_boundary {
            if let Some(content) = messages
                .get_mut(boundary)
                .and_then(|m| m.get_mut("content"))
                .and_then(|c| c.as_array_mut())
            {
                if let Some(last) = content.last_mut().and_then(|v| v.as_object_mut()) {
                    last.insert(
                        "cache_control".into(),
                        serde_json::json!({"type": "ephemeral"}),
                    );
                }
            }
        }

        let mut body = serde_json::json!({
            "model": request.model_id,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "stream": true,
        });
        let obj = body.as_object_mut().unwrap();

        if let Some(ref system) = request.system {
            let mut block = serde_json::json!({"type": "text", "text": system.text});
            if system.cache_point {
                block["cache_control"] = serde_json::json!({"type": "ephemeral"});
            }
            obj.insert("system".into(), serde_json::json!([block]));
        }

        if let Some(ref catalog) = request.tools {
            if !catalog.is_empty() {
                let mut tool_defs: Vec<serde_json::Value> = catalog
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect();
                if catalog.cache_point {
                    if let Some(last) = tool_defs.last_mut().and_then(|v| v.as_object_mut()) {
                        last.insert(
                            "cache_control".into(),
                            serde_json::json!({"type": "ephemeral"}),
                        );
                    }
                }
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }
}

#[async_trait]
impl EventFeed for SseEventFeed {
    async fn open(&self, request: &ChatRequest) -> Result<EventStream> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %request.model_id, "opening response stream");

        let resp = shared_client()
            .post(&url)
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut decoder = WireDecoder::default();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(TachiError::Network(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = parse_sse_data(&line) else { continue };
                    let Ok(wire) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };
                    for event in decoder.decode(&wire) {
                        yield event;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Maps wire events onto engine stream events.
///
/// Holds only what the wire splits across events (stop reason and usage
/// arrive in `message_delta`, the terminator in `message_stop`); all content
/// state lives in the accumulator.
#[derive(Debug, Default)]
struct WireDecoder {
    stop_reason: Option<StopReason>,
    usage: Usage,
    model_id: Option<String>,
}

impl WireDecoder {
    fn decode(&mut self, wire: &serde_json::Value) -> Vec<Result<StreamEvent>> {
        let event_type = wire.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match event_type {
            "message_start" => {
                let message = wire.get("message");
                if let Some(usage) = message.and_then(|m| m.get("usage")) {
                    self.usage.input_tokens = usage
                        .get("input_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0) as u32;
                    self.usage.cache_read_tokens = usage
                        .get("cache_read_input_tokens")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as u32);
                    self.usage.cache_creation_tokens = usage
                        .get("cache_creation_input_tokens")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as u32);
                }
                self.model_id = message
                    .and_then(|m| m.get("model"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                vec![Ok(StreamEvent::TurnStart {
                    role: Role::Assistant,
                })]
            }
            "content_block_start" => {
                let Some(block) = wire.get("content_block") else {
                    return Vec::new();
                };
                let btype = block.get("type").and_then(|t| t.as_str()).unwrap_or("");
                match btype {
                    "text" => vec![Ok(StreamEvent::BlockStart {
                        block: BlockKind::Text,
                    })],
                    "thinking" => vec![Ok(StreamEvent::BlockStart {
                        block: BlockKind::Reasoning,
                    })],
                    "redacted_thinking" => {
                        let mut events = vec![Ok(StreamEvent::BlockStart {
                            block: BlockKind::RedactedReasoning,
                        })];
                        if let Some(data) = block.get("data").and_then(|v| v.as_str()) {
                            events.push(Ok(StreamEvent::BlockDelta {
                                delta: DeltaPayload::RedactedReasoning {
                                    data: data.to_string(),
                                },
                            }));
                        }
                        events
                    }
                    "tool_use" => {
                        let call_id = block
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        let name = block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        vec![Ok(StreamEvent::BlockStart {
                            block: BlockKind::ToolUse { call_id, name },
                        })]
                    }
                    _ => Vec::new(),
                }
            }
            "content_block_delta" => {
                let Some(delta) = wire.get("delta") else {
                    return Vec::new();
                };
                let dtype = delta.get("type").and_then(|t| t.as_str()).unwrap_or("");
                let payload = match dtype {
                    "text_delta" => delta.get("text").and_then(|t| t.as_str()).map(|text| {
                        DeltaPayload::Text {
                            text: text.to_string(),
                        }
                    }),
                    "thinking_delta" => {
                        delta.get("thinking").and_then(|t| t.as_str()).map(|text| {
                            DeltaPayload::Reasoning {
                                text: text.to_string(),
                            }
                        })
                    }
                    "signature_delta" => {
                        delta.get("signature").and_then(|t| t.as_str()).map(|sig| {
                            DeltaPayload::ReasoningSignature {
                                signature: sig.to_string(),
                            }
                        })
                    }
                    "input_json_delta" => delta
                        .get("partial_json")
                        .and_then(|t| t.as_str())
                        .map(|json| DeltaPayload::ToolInput {
                            partial_json: json.to_string(),
                        }),
                    _ => None,
                };
                payload
                    .map(|delta| vec![Ok(StreamEvent::BlockDelta { delta })])
                    .unwrap_or_default()
            }
            "content_block_stop" => vec![Ok(StreamEvent::BlockStop)],
            "message_delta" => {
                if let Some(stop) = wire
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|s| s.as_str())
                {
                    self.stop_reason = parse_stop_reason(stop);
                }
                if let Some(output) = wire
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(|v| v.as_u64())
                {
                    self.usage.output_tokens = output as u32;
                }
                Vec::new()
            }
            "message_stop" => {
                let stop_reason = self.stop_reason.take().unwrap_or(StopReason::EndTurn);
                let mut usage = std::mem::take(&mut self.usage);
                usage.total_tokens = usage.input_tokens + usage.output_tokens;
                vec![
                    Ok(StreamEvent::TurnStop { stop_reason }),
                    Ok(StreamEvent::ResponseMetadata {
                        metadata: ResponseMetadata {
                            usage,
                            model_id: self.model_id.take(),
                            finished_at: Some(chrono::Utc::now()),
                        },
                    }),
                ]
            }
            "error" => {
                let message = wire
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("stream error");
                vec![Err(TachiError::Stream(message.to_string()))]
            }
            _ => Vec::new(),
        }
    }
}

fn parse_stop_reason(stop: &str) -> Option<StopReason> {
    match stop {
        "end_turn" => Some(StopReason::EndTurn),
        "tool_use" => Some(StopReason::ToolUse),
        "max_tokens" => Some(StopReason::MaxTokens),
        "stop_sequence" => Some(StopReason::StopSequence),
        _ => None,
    }
}

fn build_wire_content(blocks: &[ContentBlock]) -> serde_json::Value {
    let content: Vec<serde_json::Value> = blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => serde_json::json!({"type": "text", "text": text}),
            ContentBlock::Reasoning(rc) => serde_json::json!({
                "type": "thinking",
                "thinking": rc.text,
                "signature": rc.signature,
            }),
            ContentBlock::RedactedReasoning(rc) => serde_json::json!({
                "type": "redacted_thinking",
                "data": rc.data,
            }),
            ContentBlock::ToolUse(tu) => serde_json::json!({
                "type": "tool_use",
                "id": tu.call_id,
                "name": tu.name,
                "input": tu.input,
            }),
            ContentBlock::ToolResult(tr) => {
                let parts: Vec<serde_json::Value> = tr
                    .content
                    .iter()
                    .map(|part| match part {
                        crate::types::ToolResultPart::Text { text } => {
                            serde_json::json!({"type": "text", "text": text})
                        }
                        crate::types::ToolResultPart::Data { value } => {
                            serde_json::json!({"type": "text", "text": value.to_string()})
                        }
                    })
                    .collect();
                serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tr.call_id,
                    "content": parts,
                    "is_error": tr.status == crate::types::ToolResultStatus::Error,
                })
            }
            ContentBlock::Image(img) => serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": img.mime_type,
                    "data": img.data,
                }
            }),
        })
        .collect();
    serde_json::json!(content)
}
