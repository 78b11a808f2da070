#![deny(missing_docs)]

//! Core library for the docchat server.

/// HTTP routing and REST handlers.
pub mod api;
/// History-aware retrieval chain producing grounded answers.
pub mod chain;
/// Durable chat turn mirroring.
pub mod chatlog;
/// Environment-driven configuration management.
pub mod config;
/// Uploaded document bookkeeping and text extraction.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// In-memory retrieval index and idempotent builds.
pub mod index;
/// Chat model abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Activity metrics helpers.
pub mod metrics;
mod retry;
/// Chat service coordinating the full request lifecycle.
pub mod service;
/// Conversation registry and per-session history.
pub mod session;
