//! Conversation bookkeeping: identifiers, lifecycle, and per-session chat history.
//!
//! The registry owns one mutex per session so that concurrent chat requests against the same
//! conversation serialize their read-history/append-turn cycle instead of interleaving. The
//! outer map lock is only held long enough to clone the per-session handle.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The supplied conversation identifier was never issued by this server.
    #[error("Unknown conversation: {0}")]
    NotFound(String),
}

/// One question/answer exchange. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Question as submitted by the client.
    pub question: String,
    /// Answer produced for it.
    pub answer: String,
}

/// Lifecycle of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Identifier issued, nothing else has happened.
    Created,
    /// A retrieval index has been bound to the conversation.
    IndexReady,
    /// At least one turn has been answered.
    Active,
}

/// Mutable state guarded by the per-session mutex.
#[derive(Debug)]
pub struct SessionState {
    phase: SessionPhase,
    index_id: Option<String>,
    history: Vec<ChatTurn>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Created,
            index_id: None,
            history: Vec::new(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Identifier of the retrieval index bound to this conversation, if any.
    pub fn index_id(&self) -> Option<&str> {
        self.index_id.as_deref()
    }

    /// Bind a retrieval index and advance the lifecycle.
    pub fn bind_index(&mut self, index_id: impl Into<String>) {
        self.index_id = Some(index_id.into());
        if self.phase == SessionPhase::Created {
            self.phase = SessionPhase::IndexReady;
        }
    }

    /// Turns in original append order.
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Append a completed exchange and mark the conversation active.
    pub fn push_turn(&mut self, question: String, answer: String) {
        self.history.push(ChatTurn { question, answer });
        self.phase = SessionPhase::Active;
    }
}

/// Registry mapping conversation identifiers to their state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh conversation identifier with empty history.
    pub async fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), Arc::new(Mutex::new(SessionState::new())));
        tracing::debug!(conversation = %id, "Conversation created");
        id
    }

    /// Pure existence check; the sole validation gate before chat and index operations.
    pub async fn session_exists(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Fetch the guarded state handle for a conversation.
    ///
    /// Callers that mutate history should hold the returned mutex for the whole
    /// read-answer-append cycle so concurrent questions against one conversation
    /// cannot observe each other's partial state.
    pub async fn session(&self, id: &str) -> Result<Arc<Mutex<SessionState>>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Append a turn to a conversation's history.
    pub async fn record_turn(
        &self,
        id: &str,
        question: String,
        answer: String,
    ) -> Result<(), SessionError> {
        let state = self.session(id).await?;
        let mut guard = state.lock().await;
        guard.push_turn(question, answer);
        Ok(())
    }

    /// Return a conversation's turns in append order.
    pub async fn get_history(&self, id: &str) -> Result<Vec<ChatTurn>, SessionError> {
        let state = self.session(id).await?;
        let guard = state.lock().await;
        Ok(guard.history().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn created_identifiers_are_unique() {
        let registry = SessionRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let id = registry.create_session().await;
            assert!(seen.insert(id), "identifier repeated");
        }
    }

    #[tokio::test]
    async fn unknown_session_operations_fail_with_not_found() {
        let registry = SessionRegistry::new();
        assert!(!registry.session_exists("missing").await);
        let err = registry
            .record_turn("missing", "q".into(), "a".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
        assert!(registry.get_history("missing").await.is_err());
    }

    #[tokio::test]
    async fn history_preserves_append_order() {
        let registry = SessionRegistry::new();
        let id = registry.create_session().await;
        for n in 1..=3 {
            registry
                .record_turn(&id, format!("q{n}"), format!("a{n}"))
                .await
                .unwrap();
        }
        let history = registry.get_history(&id).await.unwrap();
        let questions: Vec<_> = history.iter().map(|turn| turn.question.as_str()).collect();
        assert_eq!(questions, vec!["q1", "q2", "q3"]);
        assert_eq!(history[1].answer, "a2");
    }

    #[tokio::test]
    async fn binding_an_index_advances_the_phase() {
        let registry = SessionRegistry::new();
        let id = registry.create_session().await;
        let state = registry.session(&id).await.unwrap();
        {
            let mut guard = state.lock().await;
            assert_eq!(guard.phase(), SessionPhase::Created);
            guard.bind_index("doc-1");
            assert_eq!(guard.phase(), SessionPhase::IndexReady);
            assert_eq!(guard.index_id(), Some("doc-1"));
        }
        registry
            .record_turn(&id, "q".into(), "a".into())
            .await
            .unwrap();
        assert_eq!(state.lock().await.phase(), SessionPhase::Active);
    }
}
