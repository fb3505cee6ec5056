//! In-process record stores.
//!
//! Documents and chunks live in `HashMap`s behind `tokio::sync::RwLock`. Similarity search
//! is brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ChunkSearch, ChunkStore, DocumentStore, SearchQuery, StorageError};
use crate::models::{
    ChunkMatch, Document, DocumentChunk, DocumentStatus, NewChunk, generate_id, now_rfc3339,
};

struct StoredDocument {
    document: Document,
    // Second-resolution timestamps tie easily; insertion order breaks the tie.
    sequence: u64,
}

/// Document records kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
    next_sequence: AtomicU64,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, document: Document) -> Result<Document, StorageError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let mut documents = self.documents.write().await;
        documents.insert(
            document.id.clone(),
            StoredDocument {
                document: document.clone(),
                sequence,
            },
        );
        Ok(document)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StorageError> {
        let documents = self.documents.read().await;
        Ok(documents.get(id).map(|stored| stored.document.clone()))
    }

    async fn list(&self) -> Result<Vec<Document>, StorageError> {
        let documents = self.documents.read().await;
        let mut stored: Vec<&StoredDocument> = documents.values().collect();
        stored.sort_by(|a, b| {
            b.document
                .created_at
                .cmp(&a.document.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        Ok(stored.into_iter().map(|s| s.document.clone()).collect())
    }

    async fn update_status(&self, id: &str, status: DocumentStatus) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        let stored = documents
            .get_mut(id)
            .ok_or_else(|| StorageError::DocumentNotFound(id.to_string()))?;
        stored.document.status = status;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut documents = self.documents.write().await;
        Ok(documents.remove(id).is_some())
    }
}

/// Chunk rows and vectors kept in memory, keyed by owning document.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<String, Vec<DocumentChunk>>>,
}

impl MemoryChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn insert_batch(
        &self,
        document_id: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<usize, StorageError> {
        let created_at = now_rfc3339();
        let count = chunks.len();
        let mut stored = self.chunks.write().await;
        let rows = stored.entry(document_id.to_string()).or_default();
        rows.extend(chunks.into_iter().map(|chunk| DocumentChunk {
            id: generate_id(),
            document_id: document_id.to_string(),
            content: chunk.content,
            embedding: chunk.embedding,
            chunk_index: chunk.chunk_index,
            created_at: created_at.clone(),
        }));
        Ok(count)
    }

    async fn delete_for_document(&self, document_id: &str) -> Result<(), StorageError> {
        self.chunks.write().await.remove(document_id);
        Ok(())
    }

    async fn chunks_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentChunk>, StorageError> {
        let stored = self.chunks.read().await;
        let mut rows = stored.get(document_id).cloned().unwrap_or_default();
        rows.sort_by_key(|chunk| chunk.chunk_index);
        Ok(rows)
    }
}

#[async_trait]
impl ChunkSearch for MemoryChunkStore {
    async fn match_chunks(&self, query: SearchQuery) -> Result<Vec<ChunkMatch>, StorageError> {
        let stored = self.chunks.read().await;
        let scoped = stored.iter().filter(|(document_id, _)| {
            query
                .document_id
                .as_deref()
                .is_none_or(|wanted| wanted == document_id.as_str())
        });

        let mut matches: Vec<ChunkMatch> = scoped
            .flat_map(|(_, rows)| rows.iter())
            .filter_map(|chunk| {
                let similarity = cosine_sim(&query.vector, &chunk.embedding);
                (similarity > query.similarity_floor).then(|| ChunkMatch {
                    id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    content: chunk.content.clone(),
                    similarity,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(query.limit);
        Ok(matches)
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::delete_document_cascade;

    fn chunk(content: &str, embedding: Vec<f32>, chunk_index: usize) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            embedding,
            chunk_index,
        }
    }

    fn query(vector: Vec<f32>, document_id: Option<&str>) -> SearchQuery {
        SearchQuery {
            vector,
            similarity_floor: 0.5,
            limit: 5,
            document_id: document_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn lists_newest_documents_first() {
        let store = MemoryDocumentStore::new();
        let mut older = Document::new("old.pdf", None);
        older.created_at = "2025-01-01T00:00:00Z".into();
        let mut newer = Document::new("new.pdf", None);
        newer.created_at = "2025-06-01T00:00:00Z".into();
        store.create(older).await.unwrap();
        store.create(newer).await.unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|doc| doc.name)
            .collect();
        assert_eq!(names, vec!["new.pdf", "old.pdf"]);
    }

    #[tokio::test]
    async fn same_timestamp_breaks_tie_by_insertion() {
        let store = MemoryDocumentStore::new();
        for name in ["a.pdf", "b.pdf"] {
            let mut doc = Document::new(name, None);
            doc.created_at = "2025-01-01T00:00:00Z".into();
            store.create(doc).await.unwrap();
        }
        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].name, "b.pdf");
    }

    #[tokio::test]
    async fn update_status_requires_existing_document() {
        let store = MemoryDocumentStore::new();
        let error = store
            .update_status("missing", DocumentStatus::Ready)
            .await
            .unwrap_err();
        assert!(matches!(error, StorageError::DocumentNotFound(id) if id == "missing"));

        let doc = store.create(Document::new("a.pdf", None)).await.unwrap();
        store
            .update_status(&doc.id, DocumentStatus::Ready)
            .await
            .unwrap();
        let fetched = store.get(&doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn match_chunks_applies_floor_limit_and_order() {
        let store = MemoryChunkStore::new();
        store
            .insert_batch(
                "doc-1",
                vec![
                    chunk("exact", vec![1.0, 0.0], 0),
                    chunk("close", vec![0.9, 0.1], 1),
                    chunk("orthogonal", vec![0.0, 1.0], 2),
                ],
            )
            .await
            .unwrap();

        let matches = store.match_chunks(query(vec![1.0, 0.0], None)).await.unwrap();
        let contents: Vec<&str> = matches.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close"]);
        assert!(matches[0].similarity >= matches[1].similarity);

        let mut limited = query(vec![1.0, 0.0], None);
        limited.limit = 1;
        assert_eq!(store.match_chunks(limited).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn match_chunks_scopes_to_document() {
        let store = MemoryChunkStore::new();
        store
            .insert_batch("doc-1", vec![chunk("one", vec![1.0, 0.0], 0)])
            .await
            .unwrap();
        store
            .insert_batch("doc-2", vec![chunk("two", vec![1.0, 0.0], 0)])
            .await
            .unwrap();

        let matches = store
            .match_chunks(query(vec![1.0, 0.0], Some("doc-2")))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document_id, "doc-2");

        let unknown = store
            .match_chunks(query(vec![1.0, 0.0], Some("doc-3")))
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn chunks_come_back_in_index_order() {
        let store = MemoryChunkStore::new();
        store
            .insert_batch("doc-1", vec![chunk("b", vec![1.0], 1)])
            .await
            .unwrap();
        store
            .insert_batch("doc-1", vec![chunk("a", vec![1.0], 0)])
            .await
            .unwrap();
        let rows = store.chunks_for_document("doc-1").await.unwrap();
        let indices: Vec<usize> = rows.iter().map(|row| row.chunk_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn cascade_removes_document_and_chunks() {
        let documents = MemoryDocumentStore::new();
        let chunks = MemoryChunkStore::new();
        let doc = documents
            .create(Document::new("a.pdf", None))
            .await
            .unwrap();
        chunks
            .insert_batch(&doc.id, vec![chunk("text", vec![1.0, 0.0], 0)])
            .await
            .unwrap();

        assert!(delete_document_cascade(&documents, &chunks, &doc.id)
            .await
            .unwrap());
        assert!(documents.get(&doc.id).await.unwrap().is_none());
        assert!(chunks.chunks_for_document(&doc.id).await.unwrap().is_empty());
        assert!(!delete_document_cascade(&documents, &chunks, &doc.id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cascade_clears_chunks_of_missing_document() {
        let documents = MemoryDocumentStore::new();
        let chunks = MemoryChunkStore::new();
        chunks
            .insert_batch("gone", vec![chunk("stray", vec![1.0, 0.0], 0)])
            .await
            .unwrap();

        let removed = delete_document_cascade(&documents, &chunks, "gone")
            .await
            .unwrap();
        assert!(!removed);
        assert!(chunks.chunks_for_document("gone").await.unwrap().is_empty());
        assert!(chunks.match_chunks(query(vec![1.0, 0.0], None)).await.unwrap().is_empty());
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_sim(&[], &[]), 0.0);
        assert_eq!(cosine_sim(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_sim(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_sim(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
