//! HTTP client wrapper for the chunk collection in Qdrant.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

use crate::models::{ChunkMatch, DocumentChunk, NewChunk, generate_id, now_rfc3339};
use crate::qdrant::{
    filters::{any_document_filter, document_filter},
    payload::{build_chunk_payload, chunk_match_from_point},
    scroller::stream_document_chunks,
    types::{QdrantError, QdrantSettings, QueryResponse, QueryResponseResult, ScoredPoint},
};
use crate::storage::{ChunkSearch, ChunkStore, SearchQuery, StorageError};

/// Lightweight HTTP client for Qdrant operations on a single collection.
pub struct QdrantService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl QdrantService {
    /// Construct a client for the configured collection.
    pub fn new(settings: &QdrantSettings) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("pdfchat/0.1").build()?;

        let base_url = normalize_base_url(&settings.url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection = %settings.collection,
            has_api_key = %settings
                .api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
            collection: settings.collection.clone(),
        })
    }

    /// Name of the collection this client writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection when missing and make sure filter indexes exist.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<(), QdrantError> {
        if !self.collection_exists().await? {
            tracing::debug!(
                collection = %self.collection,
                vector_size,
                "Creating collection"
            );
            self.create_collection(vector_size).await?;
        }
        self.ensure_payload_indexes().await
    }

    async fn create_collection(&self, vector_size: u64) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Collection created");
        })
        .await
    }

    async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    /// Ensure payload indexes exist for document scoping and ordering.
    pub async fn ensure_payload_indexes(&self) -> Result<(), QdrantError> {
        let fields: [(&str, &str); 2] = [("document_id", "keyword"), ("chunk_index", "integer")];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .query(&[("wait", true)])
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(collection = %self.collection, field, schema, "Payload index ensured");
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, schema, "Payload index already exists");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Upload a batch of embedded chunks for `document_id`.
    pub async fn upsert_chunks(
        &self,
        document_id: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<usize, QdrantError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let now = now_rfc3339();
        let serialized: Vec<Value> = chunks
            .into_iter()
            .map(|chunk| {
                let payload = build_chunk_payload(document_id, &chunk, &now);
                json!({
                    "id": generate_id(),
                    "vector": chunk.embedding,
                    "payload": payload,
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                document_id,
                points = point_count,
                "Chunks indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Perform a similarity search, returning scored payloads.
    pub async fn search_points(
        &self,
        vector: Vec<f32>,
        filter: Option<Value>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let mut body = serde_json::Map::new();
        body.insert("query".into(), json!(vector));
        body.insert("limit".into(), json!(limit));
        body.insert("with_payload".into(), Value::Bool(true));

        if let Some(threshold) = score_threshold {
            body.insert("score_threshold".into(), Value::from(threshold));
        }

        if let Some(filter_value) = filter {
            body.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&Value::Object(body))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let results = points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect();

        Ok(results)
    }

    /// Delete every point matching `filter`.
    pub async fn delete_points(&self, filter: Value) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Points deleted");
        })
        .await
    }

    /// Remove every document chunk in the collection.
    ///
    /// Document records live in process memory, so chunks found at startup belong to
    /// documents that no longer exist.
    pub async fn purge_document_chunks(&self) -> Result<(), QdrantError> {
        self.delete_points(any_document_filter()).await?;
        tracing::info!(collection = %self.collection, "Purged chunks of previous run");
        Ok(())
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl ChunkStore for QdrantService {
    async fn insert_batch(
        &self,
        document_id: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<usize, StorageError> {
        Ok(self.upsert_chunks(document_id, chunks).await?)
    }

    async fn delete_for_document(&self, document_id: &str) -> Result<(), StorageError> {
        let Some(filter) = document_filter(Some(document_id)) else {
            return Ok(());
        };
        Ok(self.delete_points(filter).await?)
    }

    async fn chunks_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentChunk>, StorageError> {
        let mut chunks: Vec<DocumentChunk> = stream_document_chunks(self, document_id)
            .try_collect()
            .await?;
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        Ok(chunks)
    }
}

#[async_trait]
impl ChunkSearch for QdrantService {
    async fn match_chunks(&self, query: SearchQuery) -> Result<Vec<ChunkMatch>, StorageError> {
        let floor = query.similarity_floor;
        let points = self
            .search_points(
                query.vector,
                document_filter(query.document_id.as_deref()),
                query.limit,
                Some(floor),
            )
            .await?;

        // Qdrant keeps scores equal to the threshold; matches must beat it.
        let matches = points
            .into_iter()
            .filter(|point| point.score > floor)
            .filter_map(chunk_match_from_point)
            .take(query.limit)
            .collect();
        Ok(matches)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn service_for(server: &MockServer) -> QdrantService {
        QdrantService::new(&QdrantSettings {
            url: server.base_url(),
            collection: "demo".into(),
            api_key: Some("secret".into()),
        })
        .expect("service")
    }

    #[tokio::test]
    async fn match_chunks_sends_filter_and_threshold() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .header("api-key", "secret")
                    .json_body_partial(
                        r#"{
                            "limit": 5,
                            "score_threshold": 0.5,
                            "filter": {
                                "must": [
                                    { "key": "document_id", "match": { "value": "doc-1" } }
                                ]
                            }
                        }"#,
                    );
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "chunk-1",
                                "score": 0.82,
                                "payload": { "document_id": "doc-1", "content": "Example" }
                            },
                            {
                                "id": "chunk-2",
                                "score": 0.5,
                                "payload": { "document_id": "doc-1", "content": "Edge" }
                            }
                        ]
                    }
                }));
            })
            .await;

        let service = service_for(&server);
        let matches = service
            .match_chunks(SearchQuery {
                vector: vec![0.1, 0.2],
                similarity_floor: 0.5,
                limit: 5,
                document_id: Some("doc-1".into()),
            })
            .await
            .expect("search request");

        mock.assert();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "chunk-1");
        assert_eq!(matches[0].content, "Example");
        assert!((matches[0].similarity - 0.82).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn search_accepts_bare_point_list() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/demo/points/query");
                then.status(200).json_body(json!({
                    "result": [
                        { "id": 7, "score": 0.9, "payload": { "document_id": "d", "content": "c" } }
                    ]
                }));
            })
            .await;

        let points = service_for(&server)
            .search_points(vec![1.0], None, 3, None)
            .await
            .expect("search");
        assert_eq!(points[0].id, "7");
    }

    #[tokio::test]
    async fn insert_batch_writes_points_with_payloads() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/demo/points")
                    .query_param("wait", "true")
                    .body_contains("\"document_id\":\"doc-1\"")
                    .body_contains("\"chunk_index\":4");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let written = service_for(&server)
            .insert_batch(
                "doc-1",
                vec![NewChunk {
                    content: "hello".into(),
                    embedding: vec![0.3, 0.4],
                    chunk_index: 4,
                }],
            )
            .await
            .expect("insert");

        mock.assert();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn delete_for_document_filters_by_owner() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/delete")
                    .body_contains("\"document_id\"")
                    .body_contains("\"doc-9\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        service_for(&server)
            .delete_for_document("doc-9")
            .await
            .expect("delete");
        mock.assert();
    }

    #[tokio::test]
    async fn purge_removes_every_owned_chunk() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/delete")
                    .query_param("wait", "true")
                    .body_contains("\"must_not\"")
                    .body_contains("\"is_empty\"")
                    .body_contains("\"document_id\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        service_for(&server)
            .purge_document_chunks()
            .await
            .expect("purge");
        mock.assert();
    }

    #[tokio::test]
    async fn ensure_collection_creates_missing_collection() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/demo");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/demo")
                    .body_contains("\"size\":8");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let index = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo/index");
                then.status(409);
            })
            .await;

        service_for(&server)
            .ensure_collection(8)
            .await
            .expect("ensure");

        exists.assert();
        create.assert();
        index.assert_hits(2);
    }

    #[tokio::test]
    async fn failed_insert_reports_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo/points");
                then.status(400).body("bad vector");
            })
            .await;

        let error = service_for(&server)
            .insert_batch(
                "doc-1",
                vec![NewChunk {
                    content: "x".into(),
                    embedding: vec![1.0],
                    chunk_index: 0,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            StorageError::Qdrant(QdrantError::UnexpectedStatus { status, .. })
                if status == StatusCode::BAD_REQUEST
        ));
    }

    #[test]
    fn stringify_handles_numeric_and_uuid_ids() {
        assert_eq!(stringify_point_id(json!(12)), "12");
        assert_eq!(stringify_point_id(json!({ "uuid": "abc" })), "abc");
        assert_eq!(stringify_point_id(Value::Null), "");
    }
}
