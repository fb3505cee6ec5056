use std::sync::Arc;

use anyhow::Context;
use pdfchat::{
    api::{self, AppState},
    chat::{ChatPipeline, ChatSettings},
    config::Config,
    embedding, generation,
    extraction::PdfTextExtractor,
    logging,
    metrics::PipelineMetrics,
    processing::{IngestionPipeline, IngestionQueue, IngestionSettings},
    qdrant::{QdrantService, QdrantSettings},
    storage::{ChunkSearch, ChunkStore, MemoryChunkStore, MemoryDocumentStore},
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    logging::init_tracing();
    config.log_summary();

    let embedder = embedding::embedding_client_from_config(&config)
        .context("Failed to build embedding client")?;
    let generator =
        generation::chat_client_from_config(&config).context("Failed to build chat client")?;
    let (chunks, search) = chunk_backend(&config).await?;

    let documents = Arc::new(MemoryDocumentStore::new());
    let metrics = Arc::new(PipelineMetrics::new());

    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::new(PdfTextExtractor::new()),
        embedder.clone(),
        documents.clone(),
        chunks.clone(),
        metrics.clone(),
        IngestionSettings::default(),
    ));
    let (queue, worker) = IngestionQueue::start(pipeline, config.ingestion_concurrency);
    let chat = Arc::new(ChatPipeline::new(
        embedder,
        search,
        documents.clone(),
        generator,
        metrics.clone(),
        ChatSettings::default(),
    ));

    let feeds = queue.clone();
    let app = api::create_router(AppState {
        documents,
        chunks,
        queue,
        chat,
        metrics,
        max_upload_bytes: config.max_upload_bytes,
    });

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            feeds.close_feeds();
        })
        .await
        .context("Server error")?;

    tracing::info!("Waiting for in-flight ingestion to finish");
    worker.finish().await;
    Ok(())
}

/// Qdrant when configured, otherwise an in-process chunk store.
async fn chunk_backend(
    config: &Config,
) -> anyhow::Result<(Arc<dyn ChunkStore>, Arc<dyn ChunkSearch>)> {
    let Some(settings) = QdrantSettings::from_config(config) else {
        tracing::warn!("QDRANT_URL is not set; chunks are kept in memory");
        let store = Arc::new(MemoryChunkStore::new());
        let chunks: Arc<dyn ChunkStore> = store.clone();
        let search: Arc<dyn ChunkSearch> = store;
        return Ok((chunks, search));
    };

    let service = Arc::new(QdrantService::new(&settings).context("Invalid Qdrant settings")?);
    service
        .ensure_collection(config.embedding_dimension as u64)
        .await
        .with_context(|| format!("Failed to prepare collection {}", service.collection()))?;
    service
        .purge_document_chunks()
        .await
        .context("Failed to clear chunks left by a previous run")?;
    tracing::info!(collection = %service.collection(), "Using Qdrant chunk store");
    let chunks: Arc<dyn ChunkStore> = service.clone();
    let search: Arc<dyn ChunkSearch> = service;
    Ok((chunks, search))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn bind_listener(server_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
