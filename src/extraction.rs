//! Plain-text extraction from uploaded PDF bytes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while turning PDF bytes into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The PDF could not be parsed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// The blocking extraction task panicked or was cancelled.
    #[error("PDF extraction task failed: {0}")]
    TaskFailed(String),
    /// Extraction exceeded the allotted time.
    #[error("PDF extraction timed out after {0:?}")]
    TimedOut(Duration),
}

/// Turns an uploaded binary into UTF-8 text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the full text of `bytes`.
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// [`TextExtractor`] backed by `pdf-extract`, run on the blocking pool.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    timeout: Duration,
}

impl PdfTextExtractor {
    /// Extractor with the default time limit.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }

    /// Extractor with a custom time limit.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let data = bytes.to_vec();
        let task = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&data).map_err(|e| ExtractionError::Pdf(e.to_string()))
        });

        // A timed-out task keeps running on the blocking pool; its result is discarded.
        let joined = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| ExtractionError::TimedOut(self.timeout))?;
        let text = joined.map_err(|err| ExtractionError::TaskFailed(err.to_string()))??;
        tracing::debug!(bytes = bytes.len(), chars = text.len(), "Extracted PDF text");
        Ok(text)
    }
}
