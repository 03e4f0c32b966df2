//! Tachi — conversation engine for tool-augmented agents
//!
//! The streaming-and-tool-orchestration core of an agent client: decodes an
//! incremental response protocol into structured message content, drives
//! requested tool calls to completion, plans prompt cache points across
//! turns, and supports mid-stream cancellation without corrupting
//! conversation state. UI, settings, and concrete tool implementations live
//! outside this crate, behind the boundary traits in [`tools`],
//! [`moderation`], [`persist`], and [`transport`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tachi::engine::{ConversationEngine, EngineConfig, UserInput};
//! use tachi::persist::MemorySink;
//! use tachi::tools::FnInvoker;
//! use tachi::transport::SseEventFeed;
//!
//! # async fn example() -> tachi::error::Result<()> {
//! let feed = Arc::new(SseEventFeed::from_env()?);
//! let invoker = Arc::new(FnInvoker::new(|name, _input| async move {
//!     Ok(serde_json::json!({ "tool": name, "status": "ok" }))
//! }));
//! let sink = Arc::new(MemorySink::new());
//!
//! let config = EngineConfig::new("claude-sonnet-4-20250514");
//! let mut engine = ConversationEngine::new(config, feed, invoker, sink);
//!
//! let report = engine.submit(UserInput::text("list files in /tmp")).await?;
//! if let Some(message) = report.final_message {
//!     println!("{}", message.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod cache;
pub mod engine;
pub mod error;
pub mod models;
pub mod moderation;
pub mod persist;
pub mod prelude;
pub mod tools;
pub mod transport;
pub mod types;
