//! Multi-conversation session management.

use std::collections::HashMap;
use std::sync::Arc;

use crate::moderation::ContentModerator;
use crate::persist::PersistenceSink;
use crate::tools::ToolInvoker;
use crate::transport::EventFeed;

use super::{ConversationEngine, EngineConfig};

/// Manages independent engines keyed by session id.
///
/// Each session gets its own engine instance, so conversations never share
/// history or cache-boundary state.
pub struct SessionManager {
    config: EngineConfig,
    feed: Arc<dyn EventFeed>,
    invoker: Arc<dyn ToolInvoker>,
    sink: Arc<dyn PersistenceSink>,
    moderator: Option<Arc<dyn ContentModerator>>,
    sessions: HashMap<String, ConversationEngine>,
}

impl SessionManager {
    pub fn new(
        config: EngineConfig,
        feed: Arc<dyn EventFeed>,
        invoker: Arc<dyn ToolInvoker>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            config,
            feed,
            invoker,
            sink,
            moderator: None,
            sessions: HashMap::new(),
        }
    }

    pub fn with_moderator(mut self, moderator: Arc<dyn ContentModerator>) -> Self {
        self.moderator = Some(moderator);
        self
    }

    /// Get or create a session by id.
    pub fn get_or_create(&mut self, session_id: &str) -> &mut ConversationEngine {
        let config = self.config.clone();
        let feed = self.feed.clone();
        let invoker = self.invoker.clone();
        let sink = self.sink.clone();
        let moderator = self.moderator.clone();
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let mut engine = ConversationEngine::new(config, feed, invoker, sink);
                if let Some(moderator) = moderator {
                    engine = engine.with_moderator(moderator);
                }
                engine
            })
    }

    /// Get an existing session.
    pub fn get(&self, session_id: &str) -> Option<&ConversationEngine> {
        self.sessions.get(session_id)
    }

    /// Remove a session.
    pub fn remove(&mut self, session_id: &str) -> Option<ConversationEngine> {
        self.sessions.remove(session_id)
    }

    /// List session ids.
    pub fn session_ids(&self) -> Vec<&str> {
        self.sessions.keys().map(|k| k.as_str()).collect()
    }
}
