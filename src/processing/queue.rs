//! Background ingestion queue.
//!
//! Uploads hand their bytes to [`IngestionQueue::begin_ingestion`] and return immediately.
//! A single dispatcher task pulls jobs off an unbounded channel and runs at most
//! `concurrency` pipelines at once. Status transitions are broadcast to subscribers; live
//! feeds end when [`IngestionQueue::close_feeds`] is called so the server can shut down.

use std::sync::Arc;

use async_stream::stream;
use futures_util::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Semaphore, broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::ingestion::IngestionPipeline;
use crate::models::DocumentStatus;

const EVENT_CAPACITY: usize = 256;

/// Errors returned when handing work to the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The dispatcher has stopped and no longer accepts jobs.
    #[error("ingestion queue is closed")]
    Closed,
}

/// Status transition observed while a document is ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Document whose status changed.
    pub document_id: String,
    /// New status.
    pub status: DocumentStatus,
    /// Failure description when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct IngestionJob {
    document_id: String,
    bytes: Vec<u8>,
}

/// Cloneable handle for scheduling ingestion runs.
#[derive(Clone)]
pub struct IngestionQueue {
    jobs: mpsc::UnboundedSender<IngestionJob>,
    events: broadcast::Sender<StatusChange>,
    closing: Arc<watch::Sender<bool>>,
}

/// Owner of the dispatcher task; used to wait for in-flight work at shutdown.
pub struct IngestionWorker {
    handle: JoinHandle<()>,
}

impl IngestionQueue {
    /// Spawn the dispatcher and return the scheduling handle together with its worker.
    pub fn start(pipeline: Arc<IngestionPipeline>, concurrency: usize) -> (Self, IngestionWorker) {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = tokio::spawn(dispatch(
            pipeline,
            receiver,
            events.clone(),
            concurrency.max(1),
        ));
        let (closing, _) = watch::channel(false);
        let queue = Self {
            jobs,
            events,
            closing: Arc::new(closing),
        };
        (queue, IngestionWorker { handle })
    }

    /// Schedule ingestion of `bytes` for `document_id` without waiting for it.
    pub fn begin_ingestion(
        &self,
        document_id: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<(), QueueError> {
        let document_id = document_id.into();
        tracing::debug!(document_id = %document_id, bytes = bytes.len(), "Queued document for ingestion");
        self.jobs
            .send(IngestionJob { document_id, bytes })
            .map_err(|_| QueueError::Closed)
    }

    /// Receive every status transition emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    /// Live status transitions that end once [`close_feeds`](Self::close_feeds) is called.
    pub fn status_feed(&self) -> BoxStream<'static, StatusChange> {
        let mut changes = self.events.subscribe();
        let mut closing = self.closing.subscribe();
        Box::pin(stream! {
            loop {
                if *closing.borrow_and_update() {
                    break;
                }
                let received = tokio::select! {
                    changed = closing.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    received = changes.recv() => received,
                };
                match received {
                    Ok(change) => yield change,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Status subscriber fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// End every open status feed, current and future.
    pub fn close_feeds(&self) {
        self.closing.send_replace(true);
        tracing::debug!("Closed status feeds");
    }
}

impl IngestionWorker {
    /// Wait until every queued job has finished.
    ///
    /// Completes only after all [`IngestionQueue`] handles are dropped.
    pub async fn finish(self) {
        if let Err(error) = self.handle.await {
            tracing::error!(error = %error, "Ingestion dispatcher stopped abnormally");
        }
    }
}

async fn dispatch(
    pipeline: Arc<IngestionPipeline>,
    mut receiver: mpsc::UnboundedReceiver<IngestionJob>,
    events: broadcast::Sender<StatusChange>,
    concurrency: usize,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let pipeline = pipeline.clone();
        let events = events.clone();
        tasks.spawn(async move {
            let _permit = permit;
            publish(
                &events,
                StatusChange {
                    document_id: job.document_id.clone(),
                    status: DocumentStatus::Processing,
                    error: None,
                },
            );
            let change = match pipeline.run(&job.document_id, &job.bytes).await {
                Ok(_) => StatusChange {
                    document_id: job.document_id,
                    status: DocumentStatus::Ready,
                    error: None,
                },
                Err(error) => StatusChange {
                    document_id: job.document_id,
                    status: DocumentStatus::Error,
                    error: Some(error.to_string()),
                },
            };
            publish(&events, change);
        });

        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }
    }

    while let Some(result) = tasks.join_next().await {
        log_task_result(result);
    }
    tracing::debug!("Ingestion dispatcher drained");
}

fn publish(events: &broadcast::Sender<StatusChange>, change: StatusChange) {
    // No subscribers is the normal case.
    let _ = events.send(change);
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        tracing::error!(error = %error, "Ingestion task panicked");
    }
}
