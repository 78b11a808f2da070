//! In-memory retrieval index and the idempotent per-identifier build path.
//!
//! An index is built at most once per identifier: callers racing on the same identifier
//! serialize on a per-identifier mutex and all observe the same handle. The build itself
//! loads the document text, chunks it, dedupes identical chunks by content hash, and embeds
//! the remainder through the configured embedding client.

mod chunking;

use crate::document::{load_document_text, DocumentError, DocumentReference};
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised while building or querying a retrieval index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Build was configured with a zero chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Document text could not be loaded.
    #[error("Failed to load document: {0}")]
    Document(#[from] DocumentError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Document produced no indexable chunks.
    #[error("Document produced no indexable content")]
    EmptyDocument,
}

/// A chunk stored in the index alongside its embedding.
#[derive(Debug, Clone)]
struct IndexedChunk {
    text: String,
    vector: Vec<f32>,
}

/// A passage returned by a similarity query.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    /// Chunk text.
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Searchable in-memory index over the chunks of one document.
#[derive(Debug)]
pub struct VectorIndex {
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    fn new(chunks: Vec<IndexedChunk>) -> Self {
        Self { chunks }
    }

    /// Number of chunks held by the index.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return the `k` chunks most similar to the query vector, best first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<RetrievedPassage> {
        let mut scored: Vec<RetrievedPassage> = self
            .chunks
            .iter()
            .map(|chunk| RetrievedPassage {
                text: chunk.text.clone(),
                score: cosine_similarity(&chunk.vector, query),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Create-or-reuse boundary for retrieval indexes.
#[async_trait]
pub trait IndexProvider: Send + Sync {
    /// Return the index stored under `identifier`, building it from `document` when absent.
    async fn get_or_build(
        &self,
        identifier: &str,
        document: &DocumentReference,
    ) -> Result<Arc<VectorIndex>, IndexError>;
}

type IndexSlot = Arc<Mutex<Option<Arc<VectorIndex>>>>;

/// Index provider that chunks and embeds documents through an [`EmbeddingClient`].
pub struct EmbeddingIndexProvider {
    embedder: Arc<dyn EmbeddingClient>,
    chunk_size: usize,
    chunk_overlap: usize,
    slots: Mutex<HashMap<String, IndexSlot>>,
}

impl EmbeddingIndexProvider {
    /// Create a provider with the given chunking budgets.
    pub fn new(embedder: Arc<dyn EmbeddingClient>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            embedder,
            chunk_size,
            chunk_overlap,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn build(&self, document: &DocumentReference) -> Result<Arc<VectorIndex>, IndexError> {
        let text = load_document_text(&document.path).await?;
        let chunks = chunking::chunk_text(&text, self.chunk_size, self.chunk_overlap)?;
        let unique_chunks = dedupe_chunks(chunks);
        if unique_chunks.is_empty() {
            return Err(IndexError::EmptyDocument);
        }

        let embeddings = self
            .embedder
            .generate_embeddings(unique_chunks.clone())
            .await?;

        let indexed = unique_chunks
            .into_iter()
            .zip(embeddings)
            .map(|(text, vector)| IndexedChunk { text, vector })
            .collect();
        Ok(Arc::new(VectorIndex::new(indexed)))
    }
}

/// Drop chunks whose content hash was already seen within this document.
fn dedupe_chunks(chunks: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|chunk| {
            let digest = hex::encode(Sha256::digest(chunk.as_bytes()));
            seen.insert(digest)
        })
        .collect()
}

#[async_trait]
impl IndexProvider for EmbeddingIndexProvider {
    async fn get_or_build(
        &self,
        identifier: &str,
        document: &DocumentReference,
    ) -> Result<Arc<VectorIndex>, IndexError> {
        // Two-phase locking: the map lock is dropped before the build so concurrent
        // requests for other identifiers are not blocked behind a slow build.
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(identifier.to_string()).or_default())
        };

        let mut guard = slot.lock().await;
        if let Some(existing) = guard.as_ref() {
            tracing::debug!(identifier, "Reusing existing retrieval index");
            return Ok(Arc::clone(existing));
        }

        tracing::info!(identifier, document = %document.id, "Building retrieval index");
        let index = self.build(document).await?;
        tracing::info!(identifier, chunks = index.len(), "Retrieval index ready");
        *guard = Some(Arc::clone(&index));
        Ok(index)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, _)| vec![1.0, i as f32, 0.5])
                .collect())
        }
    }

    async fn stored_text_document(content: &str) -> DocumentReference {
        let dir = std::env::temp_dir().join(format!("docchat-index-{}", Uuid::new_v4()));
        let store = DocumentStore::new(dir);
        store.save("doc.txt", content.as_bytes()).await.unwrap()
    }

    #[tokio::test]
    async fn repeated_builds_reuse_the_index() {
        let embedder = Arc::new(CountingEmbedder::new());
        let provider = EmbeddingIndexProvider::new(embedder.clone(), 50, 0);
        let document = stored_text_document("the quick brown fox jumps over the lazy dog").await;

        let first = provider.get_or_build("doc-1", &document).await.unwrap();
        let second = provider.get_or_build("doc-1", &document).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_builds_produce_exactly_one_index() {
        let embedder = Arc::new(CountingEmbedder::new());
        let provider = Arc::new(EmbeddingIndexProvider::new(embedder.clone(), 50, 0));
        let document = stored_text_document("some document text to be indexed once").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = Arc::clone(&provider);
            let document = document.clone();
            handles.push(tokio::spawn(async move {
                provider.get_or_build("shared", &document).await.unwrap()
            }));
        }
        let mut indexes = Vec::new();
        for handle in handles {
            indexes.push(handle.await.unwrap());
        }

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        for index in &indexes[1..] {
            assert!(Arc::ptr_eq(&indexes[0], index));
        }
    }

    #[tokio::test]
    async fn distinct_identifiers_build_independently() {
        let embedder = Arc::new(CountingEmbedder::new());
        let provider = EmbeddingIndexProvider::new(embedder.clone(), 50, 0);
        let document = stored_text_document("two identifiers, two builds").await;

        provider.get_or_build("a", &document).await.unwrap();
        provider.get_or_build("b", &document).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn top_k_ranks_by_cosine_similarity() {
        let index = VectorIndex::new(vec![
            IndexedChunk {
                text: "north".into(),
                vector: vec![1.0, 0.0],
            },
            IndexedChunk {
                text: "east".into(),
                vector: vec![0.0, 1.0],
            },
            IndexedChunk {
                text: "northeast".into(),
                vector: vec![1.0, 1.0],
            },
        ]);

        let hits = index.top_k(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn duplicate_chunks_are_dropped_before_embedding() {
        let chunks = vec!["same".to_string(), "same".to_string(), "other".to_string()];
        assert_eq!(dedupe_chunks(chunks), vec!["same", "other"]);
    }
}
