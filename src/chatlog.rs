//! Durable mirroring of chat turns keyed by conversation identifier.
//!
//! The mirror is best-effort: the service logs a warning and keeps serving when an append
//! fails, since the in-process registry remains the source of truth for the running server.

use crate::session::ChatTurn;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Errors raised by chat log sinks.
#[derive(Debug, Error)]
pub enum ChatLogError {
    /// Writing to the backing store failed.
    #[error("Failed to append chat turn: {0}")]
    Append(String),
}

/// Sink receiving each completed exchange.
#[async_trait]
pub trait ChatLog: Send + Sync {
    /// Append one turn under the given conversation identifier.
    async fn append(&self, conversation_id: &str, turn: &ChatTurn) -> Result<(), ChatLogError>;
}

/// In-memory chat log used when no durable path is configured.
#[derive(Default)]
pub struct MemoryChatLog {
    entries: Mutex<HashMap<String, Vec<ChatTurn>>>,
}

impl MemoryChatLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns recorded for a conversation, in append order.
    pub async fn recorded(&self, conversation_id: &str) -> Vec<ChatTurn> {
        self.entries
            .lock()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatLog for MemoryChatLog {
    async fn append(&self, conversation_id: &str, turn: &ChatTurn) -> Result<(), ChatLogError> {
        self.entries
            .lock()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct LoggedTurn<'a> {
    conversation_id: &'a str,
    question: &'a str,
    answer: &'a str,
    timestamp: String,
}

/// Append-only JSONL file log, one object per turn.
pub struct JsonlChatLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlChatLog {
    /// Create a log writing to the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ChatLog for JsonlChatLog {
    async fn append(&self, conversation_id: &str, turn: &ChatTurn) -> Result<(), ChatLogError> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let record = LoggedTurn {
            conversation_id,
            question: &turn.question,
            answer: &turn.answer,
            timestamp,
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|err| ChatLogError::Append(err.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| ChatLogError::Append(err.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| ChatLogError::Append(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn memory_log_scopes_turns_per_conversation() {
        let log = MemoryChatLog::new();
        let turn_a = ChatTurn {
            question: "qa".into(),
            answer: "aa".into(),
        };
        let turn_b = ChatTurn {
            question: "qb".into(),
            answer: "ab".into(),
        };
        log.append("conv-a", &turn_a).await.unwrap();
        log.append("conv-b", &turn_b).await.unwrap();

        assert_eq!(log.recorded("conv-a").await, vec![turn_a]);
        assert_eq!(log.recorded("conv-b").await, vec![turn_b]);
        assert!(log.recorded("conv-c").await.is_empty());
    }

    #[tokio::test]
    async fn jsonl_log_appends_one_object_per_turn() {
        let path = std::env::temp_dir().join(format!("docchat-log-{}.jsonl", Uuid::new_v4()));
        let log = JsonlChatLog::new(&path);
        let turn = ChatTurn {
            question: "what?".into(),
            answer: "that.".into(),
        };
        log.append("conv-1", &turn).await.unwrap();
        log.append("conv-1", &turn).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["conversation_id"], "conv-1");
        assert_eq!(parsed["question"], "what?");
        assert!(parsed["timestamp"].as_str().is_some());
    }
}
