//! Embedding client abstraction and the OpenAI-compatible HTTP adapter.

use crate::config::get_config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider answered with a non-success HTTP status.
    #[error("embeddings endpoint returned {status}: {body}")]
    UpstreamStatus {
        /// Status the provider answered with.
        status: reqwest::StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },
    /// Provider did not respond within the configured deadline.
    #[error("Embedding request timed out")]
    Timeout,
    /// Returned vector width does not match the configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured on the server.
        expected: usize,
        /// Dimension actually produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embedding client speaking the OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    retry_limit: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Construct a client using the globally loaded configuration.
    pub fn from_config() -> Result<Self, EmbeddingClientError> {
        let config = get_config();
        let client = reqwest::Client::builder()
            .user_agent("docchat/0.1")
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .map_err(|err| EmbeddingClientError::GenerationFailed(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            retry_limit: config.upstream_retry_limit,
        })
    }

    async fn request_embeddings(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::UpstreamStatus { status, body });
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingClientError::GenerationFailed(err.to_string()))?;
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}

fn map_transport_error(err: reqwest::Error) -> EmbeddingClientError {
    if err.is_timeout() {
        EmbeddingClientError::Timeout
    } else {
        EmbeddingClientError::GenerationFailed(err.to_string())
    }
}

fn is_transient(error: &EmbeddingClientError) -> bool {
    match error {
        EmbeddingClientError::Timeout => true,
        EmbeddingClientError::UpstreamStatus { status, .. } => {
            crate::retry::retryable_status(*status)
        }
        _ => false,
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(model = %self.model, inputs = texts.len(), "Generating embeddings");

        let mut attempt = 0usize;
        let embeddings = loop {
            match self.request_embeddings(&texts).await {
                Ok(vectors) => break vectors,
                Err(error) if is_transient(&error) && attempt < self.retry_limit => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %error,
                        "Transient embedding failure; retrying after backoff"
                    );
                    tokio::time::sleep(crate::retry::backoff_delay(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        };

        if embeddings.len() != texts.len() {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "provider returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        for vector in &embeddings {
            if vector.len() != self.dimension {
                return Err(EmbeddingClientError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        Ok(embeddings)
    }
}
