//! Ingestion orchestrator: the decision point invoked when a media record
//! is persisted with local bytes. Chooses asynchronous dispatch through the
//! upload queue or inline execution, and degrades to the inline path when
//! enqueueing fails rather than losing the upload.

use std::sync::Arc;

use vitrina_core::models::MediaRecord;
use vitrina_core::{IngestError, IngestOutcome, UploadTaskSink};

use crate::transition::{run_upload, IngestContext};

pub struct IngestionOrchestrator {
    ctx: IngestContext,
    sink: Arc<dyn UploadTaskSink>,
    upload_async: bool,
}

impl IngestionOrchestrator {
    pub fn new(ctx: IngestContext, sink: Arc<dyn UploadTaskSink>, upload_async: bool) -> Self {
        Self {
            ctx,
            sink,
            upload_async,
        }
    }

    /// Decide the execution path for a freshly persisted record.
    ///
    /// In async mode the caller observes `local_ref` set and `remote_url`
    /// still empty on return; upload completion is not implied. In sync mode
    /// (or on enqueue failure) the transition runs inline and its result is
    /// the caller's result.
    #[tracing::instrument(skip(self, record), fields(record_id = %record.id, kind = %record.kind))]
    pub async fn ingest(&self, record: &MediaRecord) -> Result<IngestOutcome, IngestError> {
        if record.is_terminal() {
            return Ok(IngestOutcome::AlreadyIngested);
        }
        if record.local_ref.is_none() {
            return Ok(IngestOutcome::NothingToIngest);
        }

        if self.upload_async {
            match self.sink.submit_upload(record.kind, record.id).await {
                Ok(task_id) => {
                    tracing::debug!(task_id = %task_id, "Upload enqueued");
                    return Ok(IngestOutcome::Enqueued);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        record_id = %record.id,
                        "Upload enqueue failed, falling back to synchronous ingestion"
                    );
                }
            }
        }

        run_upload(&self.ctx, record.id).await
    }
}
