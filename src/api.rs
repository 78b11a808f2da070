//! HTTP surface for docchat.
//!
//! This module exposes a compact Axum router with the chat-with-a-document endpoints:
//!
//! - `POST /api/start-conversation` – Mint a conversation identifier.
//! - `POST /api/upload-pdf` – Accept a multipart upload (file field `pdf`) and return
//!   `{filename, path, id}`.
//! - `POST /api/create-vector-store/:id` – Build or reuse the retrieval index for a document
//!   or conversation identifier; returns `{id, status}`.
//! - `POST /api/chat/:conversationId` – Answer a question within a conversation.
//! - `POST /api/chat` – Answer a question under a newly minted conversation.
//! - `GET /metrics` – Observe activity counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery.
//!
//! Failures are reported as a uniform `{error: message}` envelope. Validation errors map to
//! 400, unknown identifiers to 404, upstream failures to 502/504, and anything else to 500;
//! original causes are logged server-side and never leak to the client.

use crate::metrics::MetricsSnapshot;
use crate::service::{ChatApi, ChatServiceError};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the chat API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ChatApi + 'static,
{
    Router::new()
        .route("/api/start-conversation", post(start_conversation::<S>))
        .route("/api/upload-pdf", post(upload_pdf::<S>))
        .route("/api/create-vector-store/:id", post(create_vector_store::<S>))
        .route("/api/chat/:conversation_id", post(chat_scoped::<S>))
        .route("/api/chat", post(chat_unscoped::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Success response for `POST /api/start-conversation`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartConversationResponse {
    conversation_id: String,
}

async fn start_conversation<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<StartConversationResponse>, AppError>
where
    S: ChatApi,
{
    let conversation_id = service.start_conversation().await?;
    Ok(Json(StartConversationResponse { conversation_id }))
}

/// Success response for `POST /api/upload-pdf`.
#[derive(Serialize)]
struct UploadResponse {
    filename: String,
    path: String,
    id: String,
}

/// Accept a multipart upload and persist its file field.
///
/// The file must arrive under the multipart field name `pdf`; any other fields are ignored.
async fn upload_pdf<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: ChatApi,
{
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        AppError(ChatServiceError::Validation(format!(
            "Malformed multipart body: {err}"
        )))
    })? {
        if field.name() != Some("pdf") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("document.pdf")
            .to_string();
        let bytes = field.bytes().await.map_err(|err| {
            AppError(ChatServiceError::Validation(format!(
                "Failed to read uploaded file: {err}"
            )))
        })?;

        let reference = service.upload_document(&filename, &bytes).await?;
        tracing::info!(
            document = %reference.id,
            filename = %reference.filename,
            "Upload accepted"
        );
        return Ok(Json(UploadResponse {
            filename: reference.filename,
            path: reference.path.display().to_string(),
            id: reference.id,
        }));
    }

    Err(AppError(ChatServiceError::Validation(
        "Multipart file field 'pdf' is required".to_string(),
    )))
}

/// Success response for `POST /api/create-vector-store/:id`.
#[derive(Serialize)]
struct CreateVectorStoreResponse {
    id: String,
    status: String,
}

async fn create_vector_store<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<CreateVectorStoreResponse>, AppError>
where
    S: ChatApi,
{
    let ready = service.create_vector_store(&id).await?;
    Ok(Json(CreateVectorStoreResponse {
        id: ready.id,
        status: ready.status.to_string(),
    }))
}

/// Request body for the chat endpoints.
#[derive(Deserialize)]
struct ChatRequest {
    /// Question to answer; validated as present and non-empty by the service.
    #[serde(default)]
    question: Option<String>,
}

/// Success response for the chat endpoints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    conversation_id: String,
    response: ChatResponseBody,
}

/// Answer payload within a chat response.
#[derive(Serialize)]
struct ChatResponseBody {
    answer: String,
    context: Vec<String>,
}

/// Map a JSON body rejection into the uniform error envelope.
fn malformed_body(rejection: JsonRejection) -> AppError {
    AppError(ChatServiceError::Validation(format!(
        "Malformed request body: {}",
        rejection.body_text()
    )))
}

async fn chat_scoped<S>(
    State(service): State<Arc<S>>,
    Path(conversation_id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: ChatApi,
{
    let Json(request) = payload.map_err(malformed_body)?;
    let question = request.question.unwrap_or_default();
    let outcome = service.chat(Some(&conversation_id), &question).await?;
    Ok(Json(outcome.into()))
}

async fn chat_unscoped<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: ChatApi,
{
    let Json(request) = payload.map_err(malformed_body)?;
    let question = request.question.unwrap_or_default();
    let outcome = service.chat(None, &question).await?;
    Ok(Json(outcome.into()))
}

impl From<crate::service::ChatOutcome> for ChatResponse {
    fn from(outcome: crate::service::ChatOutcome) -> Self {
        Self {
            conversation_id: outcome.conversation_id,
            response: ChatResponseBody {
                answer: outcome.answer,
                context: outcome.context,
            },
        }
    }
}

/// Return a concise metrics snapshot with activity counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ChatApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "start_conversation",
                method: "POST",
                path: "/api/start-conversation",
                description: "Mint a fresh conversation identifier. Response returns { \"conversationId\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "upload_pdf",
                method: "POST",
                path: "/api/upload-pdf",
                description: "Upload a document as multipart form data (file field 'pdf'). Response returns { \"filename\", \"path\", \"id\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "create_vector_store",
                method: "POST",
                path: "/api/create-vector-store/:id",
                description: "Build or reuse the retrieval index for a document or conversation identifier (idempotent).",
                request_example: None,
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/api/chat/:conversationId",
                description: "Answer a question within a conversation, conditioned on its history and the bound document.",
                request_example: Some(json!({ "question": "What is this document about?" })),
            },
            CommandDescriptor {
                name: "chat_unscoped",
                method: "POST",
                path: "/api/chat",
                description: "Answer a question under a newly minted conversation; the response carries its identifier.",
                request_example: Some(json!({ "question": "What is this document about?" })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return activity counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

struct AppError(ChatServiceError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ChatServiceError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ChatServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ChatServiceError> for AppError {
    fn from(inner: ChatServiceError) -> Self {
        Self(inner)
    }
}
