//! PDF-to-chunks pipeline: extract, split, embed, store, mark status.

use std::sync::Arc;

use futures_util::future::try_join_all;

use super::splitter::split;
use super::types::{IngestionError, IngestionOutcome, IngestionSettings};
use crate::embedding::EmbeddingClient;
use crate::extraction::TextExtractor;
use crate::metrics::PipelineMetrics;
use crate::models::{DocumentStatus, NewChunk};
use crate::storage::{ChunkStore, DocumentStore, StorageError};

/// Turns an uploaded PDF into embedded, searchable chunks.
///
/// Chunks are embedded in batches of `batch_size`: every chunk in a batch is embedded
/// concurrently and the batch is written once all of them succeed. A failure stops the run,
/// leaving earlier batches in place and the document in `error`. If the document record
/// disappears mid-run, the run stops and every chunk written for it is discarded.
pub struct IngestionPipeline {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingClient>,
    documents: Arc<dyn DocumentStore>,
    chunks: Arc<dyn ChunkStore>,
    metrics: Arc<PipelineMetrics>,
    settings: IngestionSettings,
}

impl IngestionPipeline {
    /// Wire a pipeline from its collaborators.
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        documents: Arc<dyn DocumentStore>,
        chunks: Arc<dyn ChunkStore>,
        metrics: Arc<PipelineMetrics>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            extractor,
            embedder,
            documents,
            chunks,
            metrics,
            settings,
        }
    }

    /// Ingest `bytes` for an existing document and record the terminal status.
    ///
    /// The document ends in `ready` on success and `error` otherwise. The error is returned
    /// for reporting only; nothing needs to be rolled back by the caller.
    pub async fn run(
        &self,
        document_id: &str,
        bytes: &[u8],
    ) -> Result<IngestionOutcome, IngestionError> {
        match self.ingest(document_id, bytes).await {
            Ok(outcome) => {
                self.metrics.record_document(outcome.chunk_count as u64);
                tracing::info!(
                    document_id,
                    chunks = outcome.chunk_count,
                    batches = outcome.batches,
                    "Document ready"
                );
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!(document_id, error = %error, "Document ingestion failed");
                match self
                    .documents
                    .update_status(document_id, DocumentStatus::Error)
                    .await
                {
                    Ok(()) => {}
                    Err(StorageError::DocumentNotFound(_)) => {
                        self.discard_orphans(document_id).await;
                    }
                    Err(status_error) => {
                        tracing::error!(
                            document_id,
                            error = %status_error,
                            "Failed to mark document as errored"
                        );
                    }
                }
                self.metrics.record_failure();
                Err(error)
            }
        }
    }

    async fn ingest(
        &self,
        document_id: &str,
        bytes: &[u8],
    ) -> Result<IngestionOutcome, IngestionError> {
        self.documents
            .update_status(document_id, DocumentStatus::Processing)
            .await?;

        let text = self.extractor.extract(bytes).await?;
        if text.trim().is_empty() {
            return Err(IngestionError::EmptyContent);
        }

        let pieces = split(&text, &self.settings.splitter)?;
        if pieces.is_empty() {
            return Err(IngestionError::EmptyContent);
        }
        tracing::debug!(
            document_id,
            chars = text.chars().count(),
            chunks = pieces.len(),
            chunk_size = self.settings.splitter.chunk_size,
            chunk_overlap = self.settings.splitter.chunk_overlap,
            "Split document text"
        );

        let batch_size = self.settings.batch_size.max(1);
        let mut stored = 0;
        let mut batches = 0;
        for (batch_number, batch) in pieces.chunks(batch_size).enumerate() {
            let embeddings =
                try_join_all(batch.iter().map(|content| self.embedder.embed(content))).await?;
            self.ensure_document(document_id).await?;

            let first_index = batch_number * batch_size;
            let rows: Vec<NewChunk> = batch
                .iter()
                .zip(embeddings)
                .enumerate()
                .map(|(offset, (content, embedding))| NewChunk {
                    content: content.clone(),
                    embedding,
                    chunk_index: first_index + offset,
                })
                .collect();

            stored += self.chunks.insert_batch(document_id, rows).await?;
            batches += 1;
            self.ensure_document(document_id).await?;
            tracing::debug!(document_id, batch = batch_number, stored, "Stored chunk batch");
        }

        self.documents
            .update_status(document_id, DocumentStatus::Ready)
            .await?;

        Ok(IngestionOutcome {
            document_id: document_id.to_string(),
            chunk_count: stored,
            batches,
        })
    }

    /// Fails once the document record is gone, e.g. deleted mid-run.
    async fn ensure_document(&self, document_id: &str) -> Result<(), IngestionError> {
        match self.documents.get(document_id).await? {
            Some(_) => Ok(()),
            None => Err(StorageError::DocumentNotFound(document_id.to_string()).into()),
        }
    }

    /// Remove chunks written for a document that no longer exists.
    async fn discard_orphans(&self, document_id: &str) {
        match self.chunks.delete_for_document(document_id).await {
            Ok(()) => tracing::info!(document_id, "Discarded chunks of deleted document"),
            Err(error) => tracing::error!(
                document_id,
                error = %error,
                "Failed to discard chunks of deleted document"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::extraction::ExtractionError;
    use crate::models::Document;
    use crate::processing::splitter::SplitterOptions;
    use crate::embedding::EmbeddingClientError;
    use crate::storage::{
        ChunkSearch, MemoryChunkStore, MemoryDocumentStore, SearchQuery,
        delete_document_cascade,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticExtractor(Result<String, String>);

    #[async_trait]
    impl TextExtractor for StaticExtractor {
        async fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractionError> {
            self.0.clone().map_err(ExtractionError::Pdf)
        }
    }

    struct Harness {
        pipeline: IngestionPipeline,
        documents: Arc<MemoryDocumentStore>,
        chunks: Arc<MemoryChunkStore>,
        metrics: Arc<PipelineMetrics>,
    }

    fn harness(extracted: Result<String, String>, settings: IngestionSettings) -> Harness {
        harness_with(
            extracted,
            settings,
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryChunkStore::new()),
            Arc::new(HashEmbeddingClient::new(8)),
        )
    }

    fn harness_with(
        extracted: Result<String, String>,
        settings: IngestionSettings,
        documents: Arc<MemoryDocumentStore>,
        chunks: Arc<MemoryChunkStore>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Harness {
        let metrics = Arc::new(PipelineMetrics::new());
        let pipeline = IngestionPipeline::new(
            Arc::new(StaticExtractor(extracted)),
            embedder,
            documents.clone(),
            chunks.clone(),
            metrics.clone(),
            settings,
        );
        Harness {
            pipeline,
            documents,
            chunks,
            metrics,
        }
    }

    const DELETE_MARKER: &str = "DELETEME";

    /// Deletes the document as soon as it is asked to embed the marker chunk.
    struct DeletingEmbedder {
        inner: HashEmbeddingClient,
        documents: Arc<MemoryDocumentStore>,
        chunks: Arc<MemoryChunkStore>,
        document_id: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl EmbeddingClient for DeletingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            if text.contains(DELETE_MARKER) {
                let target = self.document_id.lock().unwrap().clone();
                if let Some(id) = target {
                    delete_document_cascade(&*self.documents, &*self.chunks, &id)
                        .await
                        .unwrap();
                }
            }
            self.inner.embed(text).await
        }
    }

    /// Tracks the most embeddings ever in flight at once.
    #[derive(Default)]
    struct CountingEmbedder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![0.5; 4])
        }
    }

    fn short_paragraphs(count: usize) -> String {
        (0..count)
            .map(|i| format!("Paragraph {i} has a handful of words in it."))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn new_document(store: &MemoryDocumentStore) -> String {
        store
            .create(Document::new("doc.pdf", Some(10)))
            .await
            .expect("create")
            .id
    }

    #[tokio::test]
    async fn stores_chunks_in_order_and_marks_ready() {
        let text = (0..12)
            .map(|i| format!("Paragraph {i} has a handful of words in it."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let settings = IngestionSettings {
            splitter: SplitterOptions::with_sizes(50, 0),
            batch_size: 5,
        };
        let h = harness(Ok(text), settings);
        let id = new_document(&h.documents).await;

        let outcome = h.pipeline.run(&id, b"%PDF").await.expect("ingest");
        assert_eq!(outcome.chunk_count, 12);
        assert_eq!(outcome.batches, 3);

        let stored = h.chunks.chunks_for_document(&id).await.unwrap();
        let indices: Vec<usize> = stored.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
        assert!(stored.iter().all(|c| c.embedding.len() == 8));

        let doc = h.documents.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(h.metrics.snapshot().chunks_indexed, 12);
    }

    #[tokio::test]
    async fn whitespace_only_text_marks_error() {
        let h = harness(Ok(" \n\t ".into()), IngestionSettings::default());
        let id = new_document(&h.documents).await;

        let error = h.pipeline.run(&id, b"%PDF").await.unwrap_err();
        assert!(matches!(error, IngestionError::EmptyContent));
        let doc = h.documents.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
        assert!(h.chunks.chunks_for_document(&id).await.unwrap().is_empty());
        assert_eq!(h.metrics.snapshot().documents_failed, 1);
    }

    #[tokio::test]
    async fn extraction_failure_marks_error() {
        let h = harness(Err("broken xref".into()), IngestionSettings::default());
        let id = new_document(&h.documents).await;

        let error = h.pipeline.run(&id, b"garbage").await.unwrap_err();
        assert!(matches!(error, IngestionError::Extraction(_)));
        let doc = h.documents.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn invalid_splitter_policy_marks_error() {
        let settings = IngestionSettings {
            splitter: SplitterOptions::with_sizes(10, 10),
            batch_size: 10,
        };
        let h = harness(Ok("some text".into()), settings);
        let id = new_document(&h.documents).await;

        let error = h.pipeline.run(&id, b"%PDF").await.unwrap_err();
        assert!(matches!(error, IngestionError::Chunking(_)));
    }

    #[tokio::test]
    async fn missing_document_is_a_persistence_error() {
        let h = harness(Ok("text".into()), IngestionSettings::default());
        let error = h.pipeline.run("unknown", b"%PDF").await.unwrap_err();
        assert!(matches!(error, IngestionError::Persistence(_)));
    }

    #[tokio::test]
    async fn document_deleted_mid_run_leaves_no_chunks() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let chunks = Arc::new(MemoryChunkStore::new());
        let embedder = Arc::new(DeletingEmbedder {
            inner: HashEmbeddingClient::new(8),
            documents: documents.clone(),
            chunks: chunks.clone(),
            document_id: std::sync::Mutex::new(None),
        });
        let paragraphs: Vec<String> = (0..25)
            .map(|i| {
                if i == 12 {
                    format!("{DELETE_MARKER}{}", "x".repeat(900 - DELETE_MARKER.len()))
                } else {
                    "x".repeat(900)
                }
            })
            .collect();
        let h = harness_with(
            Ok(paragraphs.join("\n\n")),
            IngestionSettings::default(),
            documents,
            chunks,
            embedder.clone(),
        );
        let id = new_document(&h.documents).await;
        *embedder.document_id.lock().unwrap() = Some(id.clone());

        let error = h.pipeline.run(&id, b"%PDF").await.unwrap_err();
        assert!(matches!(
            error,
            IngestionError::Persistence(StorageError::DocumentNotFound(_))
        ));
        assert!(h.documents.get(&id).await.unwrap().is_none());
        assert!(h.chunks.chunks_for_document(&id).await.unwrap().is_empty());

        let hits = h
            .chunks
            .match_chunks(SearchQuery {
                vector: HashEmbeddingClient::new(8).embed(&"x".repeat(900)).await.unwrap(),
                similarity_floor: -1.0,
                limit: 50,
                document_id: None,
            })
            .await
            .unwrap();
        assert!(hits.iter().all(|hit| hit.document_id != id));
    }

    #[tokio::test]
    async fn embeds_at_most_one_batch_at_a_time() {
        let embedder = Arc::new(CountingEmbedder::default());
        let settings = IngestionSettings {
            splitter: SplitterOptions::with_sizes(50, 0),
            batch_size: 10,
        };
        let h = harness_with(
            Ok(short_paragraphs(25)),
            settings,
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryChunkStore::new()),
            embedder.clone(),
        );
        let id = new_document(&h.documents).await;

        let outcome = h.pipeline.run(&id, b"%PDF").await.expect("ingest");
        assert_eq!(outcome.chunk_count, 25);
        assert_eq!(outcome.batches, 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 25);
        assert_eq!(embedder.peak.load(Ordering::SeqCst), 10);
    }
}
