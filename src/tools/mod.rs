//! Tool invocation boundary.
//!
//! The engine treats tool execution as an opaque async function: it imposes
//! no schema on results beyond "serializable", and never sees a tool's
//! internals.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TachiError};

/// A tool advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Executes one named tool call.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &str, input: &serde_json::Value) -> Result<serde_json::Value>;
}

type InvokerHandler = dyn Fn(String, serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
    + Send
    + Sync;

/// Closure-based invoker for quick wiring and tests.
pub struct FnInvoker {
    handler: Arc<InvokerHandler>,
}

impl FnInvoker {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(String, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |name, input| Box::pin(handler(name, input))),
        }
    }
}

#[async_trait]
impl ToolInvoker for FnInvoker {
    async fn invoke(&self, name: &str, input: &serde_json::Value) -> Result<serde_json::Value> {
        (self.handler)(name.to_string(), input.clone()).await
    }
}

impl std::fmt::Debug for FnInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInvoker").finish()
    }
}

/// An invoker that rejects every call. Useful when no tools are wired.
#[derive(Debug, Default)]
pub struct NullInvoker;

#[async_trait]
impl ToolInvoker for NullInvoker {
    async fn invoke(&self, name: &str, _input: &serde_json::Value) -> Result<serde_json::Value> {
        Err(TachiError::ToolExecution {
            tool_name: name.to_string(),
            message: "no tool invoker configured".to_string(),
        })
    }
}
