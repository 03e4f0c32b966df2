//! Inference stream transport boundary.

pub mod sse;

pub use sse::SseEventFeed;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{Result, TachiError};
use crate::types::{ChatRequest, StreamEvent};

/// An ordered feed of stream events for one request.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Opens one streamed response per request.
///
/// Implementations own the wire format; the engine only sees `StreamEvent`s.
#[async_trait]
pub trait EventFeed: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<EventStream>;
}

/// Map an HTTP status code onto the error taxonomy.
pub(crate) fn status_to_error(status: u16, body: &str) -> TachiError {
    match status {
        401 | 403 => TachiError::Authentication(body.to_string()),
        429 => TachiError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => TachiError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}
