//! Tracing configuration and log routing.
//!
//! Logs go to stdout with a compact formatter. When `DOCCHAT_LOG_FILE` is set, a second
//! layer appends to that file through a non-blocking writer so request handling does not
//! stall on disk I/O. Filtering follows `RUST_LOG`, defaulting to `info`.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Keeps the non-blocking writer's worker thread alive for the process lifetime.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install tracing subscribers for stdout and, when configured, a log file.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match open_log_file() {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

fn open_log_file() -> Option<std::fs::File> {
    let path = std::env::var("DOCCHAT_LOG_FILE").ok()?;
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("Failed to open log file {path}: {err}");
            None
        }
    }
}
