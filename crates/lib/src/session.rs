//! Per-source chat sessions.
//!
//! Each LINE user, group or room gets its own bounded history, so one user's conversation
//! never leaks into another's. Handlers read the history before a chat call and append the
//! exchange after it succeeds.

use crate::llm::ChatTurn;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Session key: the event's source id.
pub type SessionId = String;

/// A session: id and ordered turn history.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub turns: Vec<ChatTurn>,
}

/// In-memory store of sessions keyed by source id.
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, Session>>>,
    max_turns: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(20)
    }
}

impl SessionStore {
    /// `max_turns` bounds each history; 0 keeps no history at all.
    pub fn new(max_turns: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            max_turns,
        }
    }

    /// Turns recorded for `id` (empty for an unknown source).
    pub async fn history(&self, id: &str) -> Vec<ChatTurn> {
        self.inner
            .read()
            .await
            .get(id)
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Append a completed user/model exchange, creating the session if needed and dropping
    /// the oldest turns beyond the bound.
    pub async fn append_exchange(
        &self,
        id: &str,
        user: impl Into<String>,
        model: impl Into<String>,
    ) {
        if self.max_turns == 0 {
            return;
        }
        let mut g = self.inner.write().await;
        let session = g.entry(id.to_string()).or_insert_with(|| Session {
            id: id.to_string(),
            turns: Vec::new(),
        });
        session.turns.push(ChatTurn::user(user));
        session.turns.push(ChatTurn::model(model));
        // Drop whole exchanges so history always starts with a user turn.
        let excess = session.turns.len().saturating_sub(self.max_turns);
        let excess = (excess + excess % 2).min(session.turns.len());
        if excess > 0 {
            session.turns.drain(..excess);
        }
    }

    /// Forget the history of `id`. Returns true if a session existed.
    pub async fn clear(&self, id: &str) -> bool {
        self.inner.write().await.remove(id).is_some()
    }

    /// Return a clone of the session if it exists.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;

    #[tokio::test]
    async fn sessions_are_isolated_per_source() {
        let store = SessionStore::new(10);
        store.append_exchange("U1", "hi", "hello").await;
        store.append_exchange("U2", "yo", "hey").await;
        let h1 = store.history("U1").await;
        assert_eq!(h1, vec![ChatTurn::user("hi"), ChatTurn::model("hello")]);
        assert_eq!(store.history("U2").await.len(), 2);
        assert!(store.history("U3").await.is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded_oldest_first() {
        let store = SessionStore::new(4);
        for i in 0..3 {
            store
                .append_exchange("U1", format!("q{}", i), format!("a{}", i))
                .await;
        }
        let h = store.history("U1").await;
        assert_eq!(h.len(), 4);
        assert_eq!(h[0], ChatTurn::user("q1"));
        assert_eq!(h[3].role, ChatRole::Model);
        assert_eq!(h[3].text, "a2");
    }

    #[tokio::test]
    async fn odd_bound_keeps_whole_exchanges() {
        let store = SessionStore::new(3);
        store.append_exchange("U1", "q1", "a1").await;
        store.append_exchange("U1", "q2", "a2").await;
        let h = store.history("U1").await;
        assert_eq!(h, vec![ChatTurn::user("q2"), ChatTurn::model("a2")]);
        store.append_exchange("U1", "q3", "a3").await;
        let h = store.history("U1").await;
        assert_eq!(h, vec![ChatTurn::user("q3"), ChatTurn::model("a3")]);
    }

    #[tokio::test]
    async fn clear_forgets_history() {
        let store = SessionStore::new(4);
        store.append_exchange("U1", "q", "a").await;
        assert!(store.clear("U1").await);
        assert!(!store.clear("U1").await);
        assert!(store.get("U1").await.is_none());
    }

    #[tokio::test]
    async fn zero_bound_keeps_nothing() {
        let store = SessionStore::new(0);
        store.append_exchange("U1", "q", "a").await;
        assert!(store.get("U1").await.is_none());
    }
}
