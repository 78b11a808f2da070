//! Answer chain: history-aware query rewriting, retrieval, and answer synthesis.
//!
//! One chain wraps one retrieval index. Answering a question runs up to three collaborator
//! calls in sequence: an optional rewrite turning the question plus prior turns into a
//! standalone search query, an embedding of that query, and a final completion grounded in
//! the retrieved passages. The synthesis prompt instructs the model to answer only from the
//! provided context rather than fabricate.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::index::VectorIndex;
use crate::llm::{ChatMessage, ChatModel, ChatModelError};
use crate::session::ChatTurn;
use std::sync::Arc;
use thiserror::Error;

const SYNTHESIS_PROMPT: &str = "You are a document assistant. Answer the user's question using \
only the provided context. If the context does not contain the answer, say you do not know \
instead of inventing one.";

const REWRITE_PROMPT: &str = "Given the conversation so far and the latest user question, \
rewrite the question as a single standalone search query. Reply with the query only.";

/// Errors raised while producing an answer.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Embedding the search query failed.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// A chat completion failed.
    #[error("Chat model failed: {0}")]
    Completion(#[from] ChatModelError),
}

/// Result of one answered question.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Synthesized answer text.
    pub answer: String,
    /// Passages the answer was grounded in, best match first.
    pub context: Vec<String>,
}

/// A retrieval chain bound to one index.
pub struct AnswerChain {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl AnswerChain {
    /// Compose a chain over the given index.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        model: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
            top_k,
        }
    }

    /// Answer a question conditioned on prior turns.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<AnswerOutcome, ChainError> {
        let query = if history.is_empty() {
            question.to_string()
        } else {
            self.rewrite_query(question, history).await?
        };

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.clone()])
            .await?;
        let query_vector = vectors.pop().unwrap_or_default();

        let passages = self.index.top_k(&query_vector, self.top_k);
        let context: Vec<String> = passages.into_iter().map(|hit| hit.text).collect();

        let answer = self
            .model
            .complete(synthesis_messages(question, history, &context))
            .await?;

        tracing::debug!(
            query = %query,
            passages = context.len(),
            "Answer synthesized"
        );
        Ok(AnswerOutcome { answer, context })
    }

    /// Turn the latest question plus prior turns into a standalone search query.
    async fn rewrite_query(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, ChainError> {
        let mut messages = vec![ChatMessage::system(REWRITE_PROMPT)];
        for turn in history {
            messages.push(ChatMessage::user(turn.question.clone()));
            messages.push(ChatMessage::assistant(turn.answer.clone()));
        }
        messages.push(ChatMessage::user(question));

        let rewritten = self.model.complete(messages).await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            // A blank rewrite would retrieve nothing useful; keep the original question.
            Ok(question.to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }
}

fn synthesis_messages(
    question: &str,
    history: &[ChatTurn],
    context: &[String],
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(format!(
        "{SYNTHESIS_PROMPT}\n\nContext:\n{}",
        context.join("\n---\n")
    ))];
    for turn in history {
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }
    messages.push(ChatMessage::user(question));
    messages
}
