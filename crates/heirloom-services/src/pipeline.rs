//! Ingestion pipeline
//!
//! One run per upload: stage the raw parts, merge them into a single PDF, store the merged
//! document, extract its text, and record the outcome as a Draft. Every run ends in exactly
//! one terminal Draft write, REVIEW on success or ERROR on failure; failures are re-raised
//! after the ERROR draft is written.

use std::sync::Arc;
use std::time::{Duration, Instant};

use heirloom_core::models::Draft;
use heirloom_core::{AppError, ErrorMetadata};
use heirloom_db::DraftRepository;
use heirloom_processing::{MergeEngine, MergedDocument, ObjectStager};
use heirloom_storage::keys::merged_key;
use heirloom_storage::Storage;

use crate::extraction::{require_data, ExtractionClient, ExtractionError};

/// Outcome of the steps before the Draft write.
struct Extracted {
    merged_key: String,
    parsed_data: serde_json::Value,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    stager: ObjectStager,
    merge_engine: MergeEngine,
    storage: Arc<dyn Storage>,
    extraction: Arc<dyn ExtractionClient>,
    drafts: DraftRepository,
    extraction_timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        stager: ObjectStager,
        storage: Arc<dyn Storage>,
        extraction: Arc<dyn ExtractionClient>,
        drafts: DraftRepository,
        extraction_timeout: Duration,
    ) -> Self {
        Self {
            stager,
            merge_engine: MergeEngine::new(),
            storage,
            extraction,
            drafts,
            extraction_timeout,
        }
    }

    /// Process one upload and return the REVIEW draft that was written.
    ///
    /// On failure an ERROR draft is written first and the original error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, upload_id: &str, requester_id: &str) -> Result<Draft, AppError> {
        let start = Instant::now();

        let outcome = match self.process(upload_id, requester_id).await {
            Ok(extracted) => {
                let draft = Draft::review(
                    upload_id,
                    requester_id,
                    extracted.merged_key.clone(),
                    extracted.parsed_data,
                );
                match self.drafts.put(&draft).await {
                    Ok(()) => Ok(draft),
                    Err(e) => Err((Some(extracted.merged_key), e)),
                }
            }
            Err(failure) => Err(failure),
        };

        match outcome {
            Ok(draft) => {
                tracing::info!(
                    s3_key = draft.s3_key.as_deref().unwrap_or_default(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Upload processed, draft ready for review"
                );
                Ok(draft)
            }
            Err((merged_key, err)) => {
                self.record_failure(upload_id, requester_id, merged_key, &err)
                    .await;
                tracing::warn!(
                    error_code = err.error_code(),
                    error = %err,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Upload processing failed"
                );
                Err(err)
            }
        }
    }

    /// Stage, merge, store, extract. On failure also returns the merged key if the merged
    /// document was already stored.
    async fn process(
        &self,
        upload_id: &str,
        requester_id: &str,
    ) -> Result<Extracted, (Option<String>, AppError)> {
        let batch = self
            .stager
            .stage(upload_id, requester_id)
            .await
            .map_err(|e| (None, e))?;

        let engine = self.merge_engine;
        let parts = batch.parts;
        let merged: MergedDocument = tokio::task::spawn_blocking(move || engine.merge(&parts))
            .await
            .map_err(|e| (None, AppError::Internal(format!("Merge task failed: {}", e))))?
            .map_err(|e| (None, AppError::from(e)))?;

        if merged.is_empty() {
            tracing::warn!(
                skipped = merged.skipped.len(),
                "Merged document has no pages; continuing with an empty document"
            );
        }

        let key = merged_key(upload_id).map_err(|e| (None, AppError::from(e)))?;
        let page_count = merged.page_count;
        self.storage
            .upload_with_key(&key, merged.bytes.clone(), "application/pdf")
            .await
            .map_err(|e| (None, AppError::from(e)))?;

        tracing::debug!(key = %key, pages = page_count, "Stored merged document");

        let parsed_data = match tokio::time::timeout(
            self.extraction_timeout,
            self.extraction.extract(&merged.bytes),
        )
        .await
        {
            Ok(result) => result.and_then(require_data),
            Err(_) => Err(ExtractionError::Timeout(self.extraction_timeout)),
        }
        .map_err(|e| (Some(key.clone()), AppError::from(e)))?;

        Ok(Extracted {
            merged_key: key,
            parsed_data,
        })
    }

    /// Write the ERROR draft for a failed run. A failure here is logged and does not
    /// replace the error that caused the run to fail.
    async fn record_failure(
        &self,
        upload_id: &str,
        requester_id: &str,
        merged_key: Option<String>,
        err: &AppError,
    ) {
        let draft = Draft::failed(upload_id, requester_id, merged_key, err.to_string());
        if let Err(write_err) = self.drafts.put(&draft).await {
            tracing::error!(
                error = %err,
                write_error = %write_err,
                "Failed to record ERROR draft"
            );
        }
    }
}
