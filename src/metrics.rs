use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and chat activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    documents_failed: AtomicU64,
    chunks_indexed: AtomicU64,
    chat_requests: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that reached `ready` and the number of chunks stored for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a document whose ingestion ended in `error`.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chat request that passed validation.
    pub fn record_chat(&self) {
        self.chat_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            chat_requests: self.chat_requests.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that reached `ready` since startup.
    pub documents_ingested: u64,
    /// Documents that ended in `error` since startup.
    pub documents_failed: u64,
    /// Chunks stored across all ready documents.
    pub chunks_indexed: u64,
    /// Chat requests accepted since startup.
    pub chat_requests: u64,
}
