//! End-to-end tests exercising the HTTP surface against a mocked upstream LLM API.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use docchat::{api, config, service::ChatService};
use httpmock::{Method::POST, MockServer};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

static INIT: OnceCell<()> = OnceCell::const_new();

fn set_env(key: &str, value: &str) {
    // Configuration is installed exactly once, before any test reads it.
    std::env::set_var(key, value)
}

/// Start the shared mock upstream and install global configuration exactly once.
async fn ensure_harness() {
    INIT.get_or_init(|| async {
        let server = Box::leak(Box::new(MockServer::start_async().await));

        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200)
                    .json_body(json!({ "data": [ { "embedding": [0.1, 0.2, 0.3, 0.4] } ] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant",
                                       "content": "It is a short document about testing." } }
                    ]
                }));
            })
            .await;

        let upload_dir = std::env::temp_dir().join(format!("docchat-e2e-{}", Uuid::new_v4()));
        set_env("LLM_BASE_URL", &server.base_url());
        set_env("CHAT_MODEL", "gpt-test");
        set_env("EMBEDDING_MODEL", "embed-test");
        set_env("EMBEDDING_DIMENSION", "4");
        set_env("UPLOAD_DIR", upload_dir.to_str().expect("upload dir path"));
        set_env("UPSTREAM_TIMEOUT_SECS", "5");
        set_env("UPSTREAM_RETRY_LIMIT", "0");

        config::init_config();
    })
    .await;
}

/// Fresh router over a fresh service; upstream and configuration are shared.
async fn test_app() -> Router {
    ensure_harness().await;
    api::create_router(Arc::new(
        ChatService::new().expect("service initialization"),
    ))
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let request = match body {
        Some(payload) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string())),
        None => Request::builder().method(method).uri(uri).body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn upload_text_document(app: &Router, filename: &str, content: &str) -> serde_json::Value {
    let boundary = "XDOCCHATE2E";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"pdf\"; filename=\"{filename}\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/upload-pdf")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn scenario_upload_index_and_chat() {
    let app = test_app().await;

    let upload = upload_text_document(&app, "notes.txt", "This file describes the test suite.").await;
    let document_id = upload["id"].as_str().expect("document id");
    assert!(!document_id.is_empty());
    assert_eq!(upload["filename"], "notes.txt");
    assert!(upload["path"].as_str().expect("path").contains(document_id));

    let (status, ready) = send_json(
        &app,
        Method::POST,
        &format!("/api/create-vector-store/{document_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["id"], document_id);
    assert_eq!(ready["status"], "ready");

    let (status, started) =
        send_json(&app, Method::POST, "/api/start-conversation", None).await;
    assert_eq!(status, StatusCode::OK);
    let conversation_id = started["conversationId"].as_str().expect("conversation id");

    let (status, reply) = send_json(
        &app,
        Method::POST,
        &format!("/api/chat/{conversation_id}"),
        Some(json!({ "question": "What is this document about?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["conversationId"], conversation_id);
    let answer = reply["response"]["answer"].as_str().expect("answer");
    assert!(!answer.is_empty());
    assert!(reply["response"]["context"].as_array().is_some());
}

#[tokio::test]
async fn chat_against_a_fabricated_identifier_is_an_error() {
    let app = test_app().await;
    let fabricated = Uuid::new_v4().to_string();

    let (status, body) = send_json(
        &app,
        Method::POST,
        &format!("/api/chat/{fabricated}"),
        Some(json!({ "question": "anyone home?" })),
    )
    .await;

    assert_ne!(status, StatusCode::OK);
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn chat_with_missing_question_is_rejected() {
    let app = test_app().await;

    let (status, body) = send_json(&app, Method::POST, "/api/chat", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error").contains("Question"));

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "question": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeated_index_creation_builds_once() {
    let app = test_app().await;

    let upload = upload_text_document(&app, "dup.txt", "Same document, indexed once.").await;
    let document_id = upload["id"].as_str().expect("document id");

    for _ in 0..2 {
        let (status, ready) = send_json(
            &app,
            Method::POST,
            &format!("/api/create-vector-store/{document_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ready["status"], "ready");
    }

    let (status, metrics) = send_json(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["indexes_built"], 1);
}

#[tokio::test]
async fn follow_up_questions_stay_in_one_conversation() {
    let app = test_app().await;

    let upload = upload_text_document(&app, "conv.txt", "A document for follow-up testing.").await;
    let document_id = upload["id"].as_str().expect("document id");
    send_json(
        &app,
        Method::POST,
        &format!("/api/create-vector-store/{document_id}"),
        None,
    )
    .await;

    let (_, first) = send_json(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "question": "What is this?" })),
    )
    .await;
    let conversation_id = first["conversationId"].as_str().expect("conversation id");

    let (status, second) = send_json(
        &app,
        Method::POST,
        &format!("/api/chat/{conversation_id}"),
        Some(json!({ "question": "Tell me more." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["conversationId"], conversation_id);
    assert!(!second["response"]["answer"]
        .as_str()
        .expect("answer")
        .is_empty());
}

#[tokio::test]
async fn create_vector_store_with_unknown_identifier_is_not_found() {
    let app = test_app().await;
    let (status, body) = send_json(
        &app,
        Method::POST,
        &format!("/api/create-vector-store/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}
