//! Model capability table.
//!
//! The cache planner consults this to decide which request fields may carry
//! cache markers; eligibility is independent per field.

use serde::{Deserialize, Serialize};

/// Describes what a model can do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCapabilities {
    /// Message history may carry a cache boundary.
    pub cache_messages: bool,
    /// The system prompt may carry a cache marker.
    pub cache_system: bool,
    /// The tool catalog may carry a cache marker.
    pub cache_tools: bool,
    pub supports_reasoning: bool,
    pub supports_vision: bool,
    pub context_length: usize,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            cache_messages: false,
            cache_system: false,
            cache_tools: false,
            supports_reasoning: false,
            supports_vision: false,
            context_length: 128_000,
        }
    }
}

impl ModelCapabilities {
    /// Whether any request field is cache-eligible.
    pub fn supports_caching(&self) -> bool {
        self.cache_messages || self.cache_system || self.cache_tools
    }
}

/// Look up capabilities by model id prefix.
///
/// Unknown models get the conservative default: no caching.
pub fn capabilities_for(model_id: &str) -> ModelCapabilities {
    if model_id.starts_with("claude-") || model_id.contains(".claude-") {
        return ModelCapabilities {
            cache_messages: true,
            cache_system: true,
            cache_tools: true,
            supports_reasoning: true,
            supports_vision: true,
            context_length: 200_000,
        };
    }
    if model_id.contains("nova") {
        // Nova caches system and messages but not the tool catalog.
        return ModelCapabilities {
            cache_messages: true,
            cache_system: true,
            cache_tools: false,
            supports_reasoning: false,
            supports_vision: true,
            context_length: 300_000,
        };
    }
    ModelCapabilities::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_models_cache_all_fields() {
        let caps = capabilities_for("claude-sonnet-4-20250514");
        assert!(caps.cache_messages);
        assert!(caps.cache_system);
        assert!(caps.cache_tools);
    }

    #[test]
    fn region_prefixed_claude_ids_resolve() {
        let caps = capabilities_for("us.claude-3-7-sonnet");
        assert!(caps.supports_caching());
    }

    #[test]
    fn nova_does_not_cache_tools() {
        let caps = capabilities_for("nova-pro-v1");
        assert!(caps.cache_messages);
        assert!(!caps.cache_tools);
    }

    #[test]
    fn unknown_model_gets_no_caching() {
        let caps = capabilities_for("some-local-model");
        assert!(!caps.supports_caching());
    }
}
