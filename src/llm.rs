//! Chat model abstraction and the OpenAI-compatible HTTP adapter.
//!
//! The server never interprets model output; it forwards message lists built by the answer
//! chain and returns the first choice's content. Transport failures and non-2xx statuses are
//! surfaced as typed errors so the façade can distinguish upstream trouble from client error.

use crate::config::get_config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by chat model backends.
#[derive(Debug, Error)]
pub enum ChatModelError {
    /// Provider returned an error or an unusable response.
    #[error("Chat completion failed: {0}")]
    CompletionFailed(String),
    /// Provider answered with a non-success HTTP status.
    #[error("chat endpoint returned {status}: {body}")]
    UpstreamStatus {
        /// Status the provider answered with.
        status: reqwest::StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },
    /// Provider did not respond within the configured deadline.
    #[error("Chat completion timed out")]
    Timeout,
}

/// Role of a chat message, serialized in OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the model's behavior.
    System,
    /// Content authored by the end user.
    User,
    /// Content previously produced by the model.
    Assistant,
}

/// One message in a chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Speaker role.
    pub role: Role,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Interface implemented by chat completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce one completion for the supplied message list.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ChatModelError>;
}

/// Chat model speaking the OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    retry_limit: usize,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpChatModel {
    /// Construct a client using the globally loaded configuration.
    pub fn from_config() -> Result<Self, ChatModelError> {
        let config = get_config();
        let client = reqwest::Client::builder()
            .user_agent("docchat/0.1")
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .map_err(|err| ChatModelError::CompletionFailed(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.chat_model.clone(),
            temperature: config.chat_temperature,
            retry_limit: config.upstream_retry_limit,
        })
    }

    async fn request_completion(
        &self,
        messages: &[ChatMessage],
    ) -> Result<String, ChatModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ChatModelError::Timeout
            } else {
                ChatModelError::CompletionFailed(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatModelError::UpstreamStatus { status, body });
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|err| ChatModelError::CompletionFailed(err.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ChatModelError::CompletionFailed("provider returned no choices".to_string())
            })
    }
}

fn is_transient(error: &ChatModelError) -> bool {
    match error {
        ChatModelError::Timeout => true,
        ChatModelError::UpstreamStatus { status, .. } => crate::retry::retryable_status(*status),
        ChatModelError::CompletionFailed(_) => false,
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ChatModelError> {
        tracing::debug!(model = %self.model, messages = messages.len(), "Requesting completion");

        let mut attempt = 0usize;
        loop {
            match self.request_completion(&messages).await {
                Ok(content) => return Ok(content),
                Err(error) if is_transient(&error) && attempt < self.retry_limit => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %error,
                        "Transient completion failure; retrying after backoff"
                    );
                    tokio::time::sleep(crate::retry::backoff_delay(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
