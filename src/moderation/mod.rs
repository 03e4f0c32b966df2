//! Optional content moderation boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which side of the conversation the text is crossing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModerationDirection {
    Input,
    Output,
}

/// Outcome of a moderation check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationVerdict {
    pub intervened: bool,
    /// Replacement text when the moderator intervened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitute: Option<String>,
}

impl ModerationVerdict {
    pub fn pass() -> Self {
        Self {
            intervened: false,
            substitute: None,
        }
    }

    pub fn intervene(substitute: impl Into<String>) -> Self {
        Self {
            intervened: true,
            substitute: Some(substitute.into()),
        }
    }
}

/// Inspects text and may replace it before it enters the conversation.
#[async_trait]
pub trait ContentModerator: Send + Sync {
    async fn check(&self, text: &str, direction: ModerationDirection) -> Result<ModerationVerdict>;
}

/// Which message flows get moderated when a moderator is configured.
///
/// The default moderates tool output only; user input moderation is opt-in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModerationPolicy {
    pub user_input: bool,
    pub tool_output: bool,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            user_input: false,
            tool_output: true,
        }
    }
}

impl ModerationPolicy {
    /// Moderate nothing, even with a moderator configured.
    pub fn disabled() -> Self {
        Self {
            user_input: false,
            tool_output: false,
        }
    }
}
