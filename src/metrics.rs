use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing server activity.
#[derive(Default)]
pub struct ChatMetrics {
    conversations_started: AtomicU64,
    documents_uploaded: AtomicU64,
    indexes_built: AtomicU64,
    turns_answered: AtomicU64,
}

impl ChatMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly minted conversation.
    pub fn record_conversation(&self) {
        self.conversations_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted upload.
    pub fn record_upload(&self) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed index build (reuse does not count).
    pub fn record_index_build(&self) {
        self.indexes_built.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_turn(&self) {
        self.turns_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            conversations_started: self.conversations_started.load(Ordering::Relaxed),
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            indexes_built: self.indexes_built.load(Ordering::Relaxed),
            turns_answered: self.turns_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the activity counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Conversations minted since startup.
    pub conversations_started: u64,
    /// Documents accepted by the upload endpoint.
    pub documents_uploaded: u64,
    /// Retrieval indexes actually built (idempotent reuses excluded).
    pub indexes_built: u64,
    /// Questions answered across all conversations.
    pub turns_answered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = ChatMetrics::new();
        metrics.record_conversation();
        metrics.record_upload();
        metrics.record_upload();
        metrics.record_turn();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.conversations_started, 1);
        assert_eq!(snapshot.documents_uploaded, 2);
        assert_eq!(snapshot.indexes_built, 0);
        assert_eq!(snapshot.turns_answered, 1);
    }
}
