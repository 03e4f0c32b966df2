//! Prompt cache-point planning.
//!
//! Marks reusable request prefixes so repeated turns pay less for unchanged
//! tokens. The boundary is a hint: a stale value loses the optimization,
//! never correctness.

use tracing::debug;

use crate::models::capabilities_for;

/// Where cache markers go for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePlan {
    /// Index into the context-limited message list after which no reusable
    /// prefix extends. `None` means no boundary marker.
    pub message_boundary: Option<usize>,
    pub cache_system: bool,
    pub cache_tools: bool,
}

impl CachePlan {
    /// A plan with no markers at all.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Per-conversation cache boundary state.
///
/// One planner per conversation: concurrent conversations must not share a
/// boundary. Reset whenever the conversation is cleared or switched.
#[derive(Debug, Default)]
pub struct CachePointPlanner {
    last_boundary: Option<usize>,
    model_id: Option<String>,
}

impl CachePointPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The boundary carried forward from the previous turn, if any.
    pub fn last_boundary(&self) -> Option<usize> {
        self.last_boundary
    }

    /// Plan markers for a request whose context-limited history has
    /// `truncated_len` messages. Messages, system prompt, and tool catalog
    /// are independently eligible per model.
    pub fn plan(&mut self, truncated_len: usize, model_id: &str) -> CachePlan {
        let caps = capabilities_for(model_id);

        // A model switch invalidates any carried boundary.
        if self.model_id.as_deref() != Some(model_id) {
            if self.model_id.is_some() {
                debug!(model = model_id, "model switch; resetting cache boundary");
            }
            self.last_boundary = None;
            self.model_id = Some(model_id.to_string());
        }

        if !caps.cache_messages {
            self.last_boundary = None;
            return CachePlan {
                message_boundary: None,
                cache_system: caps.cache_system,
                cache_tools: caps.cache_tools,
            };
        }

        let boundary = truncated_len.checked_sub(1);
        self.last_boundary = boundary;
        CachePlan {
            message_boundary: boundary,
            cache_system: caps.cache_system,
            cache_tools: caps.cache_tools,
        }
    }

    /// Forget all carried state (conversation cleared or switched).
    pub fn reset(&mut self) {
        self.last_boundary = None;
        self.model_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLAUDE: &str = "claude-sonnet-4-20250514";

    #[test]
    fn boundary_is_last_index_of_truncated_history() {
        let mut planner = CachePointPlanner::new();
        let plan = planner.plan(3, CLAUDE);
        assert_eq!(plan.message_boundary, Some(2));
        assert!(plan.cache_system);
        assert!(plan.cache_tools);
    }

    #[test]
    fn boundary_grows_with_history() {
        let mut planner = CachePointPlanner::new();
        let first = planner.plan(2, CLAUDE).message_boundary.unwrap();
        let second = planner.plan(4, CLAUDE).message_boundary.unwrap();
        assert!(second >= first);
        assert_eq!(planner.last_boundary(), Some(second));
    }

    #[test]
    fn unsupported_model_emits_no_boundary_and_resets() {
        let mut planner = CachePointPlanner::new();
        planner.plan(5, CLAUDE);
        assert!(planner.last_boundary().is_some());
        let plan = planner.plan(6, "some-local-model");
        assert_eq!(plan.message_boundary, None);
        assert_eq!(planner.last_boundary(), None);
    }

    #[test]
    fn empty_history_has_no_boundary() {
        let mut planner = CachePointPlanner::new();
        let plan = planner.plan(0, CLAUDE);
        assert_eq!(plan.message_boundary, None);
    }

    #[test]
    fn independent_planners_do_not_share_state() {
        let mut a = CachePointPlanner::new();
        let mut b = CachePointPlanner::new();
        a.plan(10, CLAUDE);
        assert_eq!(b.last_boundary(), None);
        b.plan(2, CLAUDE);
        assert_eq!(a.last_boundary(), Some(9));
        assert_eq!(b.last_boundary(), Some(1));
    }

    #[test]
    fn reset_clears_carried_boundary() {
        let mut planner = CachePointPlanner::new();
        planner.plan(4, CLAUDE);
        planner.reset();
        assert_eq!(planner.last_boundary(), None);
    }
}
