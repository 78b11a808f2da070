//! Chat service coordinating sessions, documents, index builds, and answering.
//!
//! The service owns long-lived handles to the embedding client, chat model, index provider,
//! and chat log so the HTTP surface works against one shared component. Construct it once
//! near process start and share it through an `Arc`.

use crate::{
    chain::{AnswerChain, ChainError},
    chatlog::{ChatLog, JsonlChatLog, MemoryChatLog},
    config::get_config,
    document::{DocumentError, DocumentReference, DocumentStore},
    embedding::{EmbeddingClient, EmbeddingClientError, HttpEmbeddingClient},
    index::{EmbeddingIndexProvider, IndexError, IndexProvider},
    llm::{ChatModel, ChatModelError, HttpChatModel},
    metrics::{ChatMetrics, MetricsSnapshot},
    session::{SessionError, SessionRegistry},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Errors surfaced to the HTTP façade, classified for status mapping.
#[derive(Debug, Error)]
pub enum ChatServiceError {
    /// The request was malformed (missing question, missing file).
    #[error("{0}")]
    Validation(String),
    /// A referenced conversation, document, or index does not exist.
    #[error("{0}")]
    NotFound(String),
    /// An upstream collaborator (LLM, embeddings) failed.
    #[error("Upstream request failed: {0}")]
    Upstream(String),
    /// An upstream collaborator did not answer within the deadline.
    #[error("Upstream request timed out")]
    UpstreamTimeout,
    /// Anything unexpected.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for ChatServiceError {
    fn from(err: SessionError) -> Self {
        Self::NotFound(err.to_string())
    }
}

impl From<DocumentError> for ChatServiceError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NoDocumentUploaded | DocumentError::NotFound(_) => {
                Self::NotFound(err.to_string())
            }
            DocumentError::Io(_) | DocumentError::Extraction { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<EmbeddingClientError> for ChatServiceError {
    fn from(err: EmbeddingClientError) -> Self {
        match err {
            EmbeddingClientError::Timeout => Self::UpstreamTimeout,
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<ChatModelError> for ChatServiceError {
    fn from(err: ChatModelError) -> Self {
        match err {
            ChatModelError::Timeout => Self::UpstreamTimeout,
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<IndexError> for ChatServiceError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Document(inner) => inner.into(),
            IndexError::Embedding(inner) => inner.into(),
            IndexError::EmptyDocument => Self::Validation(err.to_string()),
            IndexError::InvalidChunkSize => Self::Internal(err.to_string()),
        }
    }
}

impl From<ChainError> for ChatServiceError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Embedding(inner) => inner.into(),
            ChainError::Completion(inner) => inner.into(),
        }
    }
}

/// Confirmation that an index is ready under an identifier.
#[derive(Debug, Clone)]
pub struct IndexReady {
    /// Identifier the index is stored under.
    pub id: String,
    /// Always `"ready"` once the call returns.
    pub status: &'static str,
}

/// Result of one answered chat request.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Conversation the turn was recorded under (newly minted for unscoped chat).
    pub conversation_id: String,
    /// Synthesized answer.
    pub answer: String,
    /// Retrieved passages the answer was grounded in.
    pub context: Vec<String>,
}

/// Abstraction over the chat service used by external surfaces.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Mint a fresh conversation identifier.
    async fn start_conversation(&self) -> Result<String, ChatServiceError>;

    /// Persist an upload and return its document reference.
    async fn upload_document(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<DocumentReference, ChatServiceError>;

    /// Build or reuse the retrieval index stored under `identifier`.
    async fn create_vector_store(&self, identifier: &str) -> Result<IndexReady, ChatServiceError>;

    /// Answer a question, recording the exchange under the conversation.
    async fn chat(
        &self,
        conversation_id: Option<&str>,
        question: &str,
    ) -> Result<ChatOutcome, ChatServiceError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Concrete chat service backed by HTTP collaborators.
pub struct ChatService {
    sessions: SessionRegistry,
    documents: DocumentStore,
    provider: Arc<dyn IndexProvider>,
    embedder: Arc<dyn EmbeddingClient>,
    model: Arc<dyn ChatModel>,
    chat_log: Arc<dyn ChatLog>,
    chains: Mutex<HashMap<String, Arc<AnswerChain>>>,
    latest_chain: RwLock<Option<String>>,
    metrics: Arc<ChatMetrics>,
    top_k: usize,
    history_window: usize,
}

impl ChatService {
    /// Build the service from the globally loaded configuration.
    pub fn new() -> anyhow::Result<Self> {
        let config = get_config();
        tracing::info!("Initializing upstream clients");
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(HttpEmbeddingClient::from_config()?);
        let model: Arc<dyn ChatModel> = Arc::new(HttpChatModel::from_config()?);
        let provider: Arc<dyn IndexProvider> = Arc::new(EmbeddingIndexProvider::new(
            Arc::clone(&embedder),
            config.chunk_size,
            config.chunk_overlap,
        ));
        let chat_log: Arc<dyn ChatLog> = match &config.chat_log_path {
            Some(path) => Arc::new(JsonlChatLog::new(path)),
            None => Arc::new(MemoryChatLog::new()),
        };

        Ok(Self::with_components(
            DocumentStore::new(&config.upload_dir),
            provider,
            embedder,
            model,
            chat_log,
            config.retriever_top_k,
            config.history_window,
        ))
    }

    /// Assemble a service from explicit components. Useful for embedding and for tests.
    pub fn with_components(
        documents: DocumentStore,
        provider: Arc<dyn IndexProvider>,
        embedder: Arc<dyn EmbeddingClient>,
        model: Arc<dyn ChatModel>,
        chat_log: Arc<dyn ChatLog>,
        top_k: usize,
        history_window: usize,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            documents,
            provider,
            embedder,
            model,
            chat_log,
            chains: Mutex::new(HashMap::new()),
            latest_chain: RwLock::new(None),
            metrics: Arc::new(ChatMetrics::new()),
            top_k,
            history_window,
        }
    }

    /// Resolve the identifier passed to index creation.
    ///
    /// A document identifier wins; otherwise a known conversation identifier selects the
    /// most recent upload.
    async fn resolve_document(
        &self,
        identifier: &str,
    ) -> Result<DocumentReference, ChatServiceError> {
        match self.documents.get(identifier).await {
            Ok(document) => Ok(document),
            Err(DocumentError::NotFound(_)) => {
                if !self.sessions.session_exists(identifier).await {
                    return Err(ChatServiceError::NotFound(format!(
                        "Unknown document or conversation: {identifier}"
                    )));
                }
                Ok(self.documents.latest().await?)
            }
            Err(other) => Err(other.into()),
        }
    }
}

#[async_trait]
impl ChatApi for ChatService {
    async fn start_conversation(&self) -> Result<String, ChatServiceError> {
        let conversation_id = self.sessions.create_session().await;
        self.metrics.record_conversation();
        tracing::info!(conversation = %conversation_id, "Conversation started");
        Ok(conversation_id)
    }

    async fn upload_document(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<DocumentReference, ChatServiceError> {
        if bytes.is_empty() {
            return Err(ChatServiceError::Validation(
                "Uploaded file is empty".to_string(),
            ));
        }
        let reference = self.documents.save(filename, bytes).await?;
        self.metrics.record_upload();
        Ok(reference)
    }

    async fn create_vector_store(&self, identifier: &str) -> Result<IndexReady, ChatServiceError> {
        {
            let chains = self.chains.lock().await;
            if chains.contains_key(identifier) {
                tracing::debug!(identifier, "Vector store already ready");
                return Ok(IndexReady {
                    id: identifier.to_string(),
                    status: "ready",
                });
            }
        }

        let document = self.resolve_document(identifier).await?;
        let index = self.provider.get_or_build(identifier, &document).await?;
        let chain = Arc::new(AnswerChain::new(
            index,
            Arc::clone(&self.embedder),
            Arc::clone(&self.model),
            self.top_k,
        ));

        {
            let mut chains = self.chains.lock().await;
            if chains.insert(identifier.to_string(), chain).is_none() {
                self.metrics.record_index_build();
            }
        }
        *self.latest_chain.write().await = Some(identifier.to_string());

        // A conversation-scoped build binds the conversation only once its chain is
        // registered; a failed build leaves the conversation unbound.
        if self.sessions.session_exists(identifier).await {
            let state = self.sessions.session(identifier).await?;
            state.lock().await.bind_index(identifier);
        }

        tracing::info!(identifier, document = %document.id, "Vector store ready");
        Ok(IndexReady {
            id: identifier.to_string(),
            status: "ready",
        })
    }

    async fn chat(
        &self,
        conversation_id: Option<&str>,
        question: &str,
    ) -> Result<ChatOutcome, ChatServiceError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatServiceError::Validation(
                "Question is missing in the request body".to_string(),
            ));
        }

        let conversation_id = match conversation_id {
            Some(id) => {
                if !self.sessions.session_exists(id).await {
                    return Err(ChatServiceError::NotFound(format!(
                        "Unknown conversation: {id}"
                    )));
                }
                id.to_string()
            }
            None => self.start_conversation().await?,
        };

        // Hold the session mutex for the whole read-answer-append cycle so concurrent
        // questions against one conversation cannot interleave their history updates.
        let state = self.sessions.session(&conversation_id).await?;
        let mut guard = state.lock().await;

        let chain_id = match guard.index_id() {
            Some(id) => id.to_string(),
            None => {
                let latest = self.latest_chain.read().await.clone();
                match latest {
                    Some(id) => {
                        // Pin the conversation to the chain it first answers with, so a
                        // later upload does not silently swap its document out.
                        guard.bind_index(id.clone());
                        id
                    }
                    None => {
                        return Err(ChatServiceError::NotFound(
                            "No retrieval index is ready; upload a document and create a \
                             vector store first"
                                .to_string(),
                        ));
                    }
                }
            }
        };

        let chain = {
            let chains = self.chains.lock().await;
            chains.get(&chain_id).cloned().ok_or_else(|| {
                ChatServiceError::NotFound(format!("Unknown vector store: {chain_id}"))
            })?
        };

        let history = guard.history();
        let window_start = history.len().saturating_sub(self.history_window);
        let outcome = chain.answer(question, &history[window_start..]).await?;

        guard.push_turn(question.to_string(), outcome.answer.clone());
        self.metrics.record_turn();

        let turn = guard.history().last().cloned();
        drop(guard);
        if let Some(turn) = turn {
            if let Err(error) = self.chat_log.append(&conversation_id, &turn).await {
                tracing::warn!(conversation = %conversation_id, error = %error, "Chat log append failed");
            }
        }

        tracing::info!(conversation = %conversation_id, "Question answered");
        Ok(ChatOutcome {
            conversation_id,
            answer: outcome.answer,
            context: outcome.context,
        })
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
