use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use slide_protocol::Slide;

use crate::conversation_history::ConversationHistory;

/// Everything the engine needs to remember about one project between turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub deck: Vec<Slide>,
    pub history: ConversationHistory,
}

/// Where sessions live. Implementations decide persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The stored session, or an empty one for a new project.
    async fn load(&self, project_id: &str) -> anyhow::Result<Session>;

    async fn save(&self, project_id: &str, session: Session) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, project_id: &str) -> anyhow::Result<Session> {
        Ok(self
            .sessions
            .read()
            .await
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, project_id: &str, session: Session) -> anyhow::Result<()> {
        self.sessions
            .write()
            .await
            .insert(project_id.to_string(), session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slide_protocol::ChatMessage;

    #[tokio::test]
    async fn unknown_project_starts_empty() {
        let store = InMemorySessionStore::new();
        let session = store.load("nope").await.unwrap();
        assert!(session.deck.is_empty());
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn saves_per_project() {
        let store = InMemorySessionStore::new();
        let mut session = Session::default();
        session.history.add_item(ChatMessage::user("hello"));
        store.save("a", session.clone()).await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), session);
        assert!(store.load("b").await.unwrap().history.is_empty());
    }
}
