//! Media service: the surface the surrounding CRUD/admin layer calls.
//!
//! Create validates and stages the bytes, persists the record, and hands it
//! to the orchestrator. Delete removes the record together with any staging
//! bytes it still references. The service also implements the worker's
//! dispatch trait, so queued jobs run the same transition as the
//! synchronous path.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use vitrina_core::models::{MediaKind, MediaRecord, UploadTask};
use vitrina_core::transform::TransformOptions;
use vitrina_core::validation::{
    sanitize_filename, validate_content_type, validate_file_extension, validate_file_size,
};
use vitrina_core::{Config, IngestError, IngestOutcome, RecordStore, UploadTaskSink};
use vitrina_worker::UploadHandlerContext;

use crate::orchestrator::IngestionOrchestrator;
use crate::transition::{run_upload, IngestContext};

/// Per-kind upload limits.
#[derive(Clone, Debug)]
pub struct UploadLimits {
    pub max_size_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
}

/// Service-level options, usually derived from [`Config`].
#[derive(Clone, Debug)]
pub struct ServiceOptions {
    pub upload_async: bool,
    pub image: UploadLimits,
    pub video: UploadLimits,
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        Self {
            upload_async: config.upload_async,
            image: UploadLimits {
                max_size_bytes: config.max_image_size_bytes,
                allowed_extensions: config.image_allowed_extensions.clone(),
                allowed_content_types: config.image_allowed_content_types.clone(),
            },
            video: UploadLimits {
                max_size_bytes: config.max_video_size_bytes,
                allowed_extensions: config.video_allowed_extensions.clone(),
                allowed_content_types: config.video_allowed_content_types.clone(),
            },
        }
    }
}

pub struct MediaService {
    ctx: IngestContext,
    orchestrator: IngestionOrchestrator,
    options: ServiceOptions,
}

impl MediaService {
    pub fn new(
        ctx: IngestContext,
        sink: Arc<dyn UploadTaskSink>,
        options: ServiceOptions,
    ) -> Self {
        let orchestrator =
            IngestionOrchestrator::new(ctx.clone(), sink, options.upload_async);
        Self {
            ctx,
            orchestrator,
            options,
        }
    }

    fn limits_for(&self, kind: MediaKind) -> &UploadLimits {
        match kind {
            MediaKind::Image => &self.options.image,
            MediaKind::Video => &self.options.video,
        }
    }

    /// Attach uploaded bytes to a catalog item.
    ///
    /// Validates, stages the bytes, persists the record, and triggers
    /// ingestion. With async uploads the returned record still carries
    /// `local_ref`; with the synchronous path (or queue fallback) it already
    /// has `remote_url` set.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn create_media_record(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
        data: Vec<u8>,
        filename: &str,
        content_type: &str,
        sort_order: i32,
        is_primary: bool,
    ) -> Result<MediaRecord, IngestError> {
        let limits = self.limits_for(kind);
        validate_file_size(data.len(), limits.max_size_bytes)?;
        validate_file_extension(filename, &limits.allowed_extensions)?;
        validate_content_type(content_type, &limits.allowed_content_types)?;

        let filename = sanitize_filename(filename);
        let local_ref = self
            .ctx
            .staging
            .stage(owner_id, &filename, &data)
            .await
            .map_err(IngestError::transient)?;

        let record =
            MediaRecord::new_local(owner_id, kind, filename, local_ref, sort_order, is_primary);
        self.ctx.records.insert(&record).await?;

        // Synchronous-path failures propagate to the caller as the create
        // failing; the record stays behind with its staged bytes and can be
        // re-ingested.
        let outcome = self.orchestrator.ingest(&record).await?;

        match outcome {
            IngestOutcome::Uploaded => self
                .ctx
                .records
                .get(record.id)
                .await?
                .ok_or(IngestError::RecordNotFound(record.id)),
            _ => Ok(record),
        }
    }

    /// Remove a record. Staging bytes the record still references are
    /// deleted too, so no orphan files are left behind.
    #[tracing::instrument(skip(self))]
    pub async fn delete_media_record(&self, id: Uuid) -> Result<(), IngestError> {
        let record = self
            .ctx
            .records
            .delete(id)
            .await?
            .ok_or(IngestError::RecordNotFound(id))?;

        if let Some(local_ref) = record.local_ref {
            if let Err(e) = self.ctx.staging.delete(&local_ref).await {
                tracing::warn!(
                    error = %e,
                    record_id = %id,
                    local_ref = %local_ref,
                    "Failed to delete staged bytes for removed record"
                );
            }
        }

        Ok(())
    }

    /// Sibling records for one owner and kind, in display order.
    pub async fn list_media_records(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<Vec<MediaRecord>, IngestError> {
        self.ctx.records.list_for_owner(owner_id, kind).await
    }

    /// Transformed URL for a record, or `None` while ingestion is pending.
    ///
    /// Without transform options the stored URL is returned unchanged; when
    /// the store's rewrite capability is unavailable the untransformed URL
    /// is returned rather than failing the caller.
    #[tracing::instrument(skip(self, options))]
    pub async fn transformed_url(
        &self,
        record_id: Uuid,
        options: &TransformOptions,
    ) -> Result<Option<String>, IngestError> {
        let record = self
            .ctx
            .records
            .get(record_id)
            .await?
            .ok_or(IngestError::RecordNotFound(record_id))?;

        let Some(url) = record.remote_url else {
            return Ok(None);
        };

        if options.is_empty() {
            return Ok(Some(url));
        }

        Ok(Some(
            self.ctx
                .remote
                .transform_url(&url, options)
                .unwrap_or(url),
        ))
    }
}

#[async_trait]
impl UploadHandlerContext for MediaService {
    async fn handle_upload(self: Arc<Self>, task: &UploadTask) -> Result<serde_json::Value> {
        let outcome = run_upload(&self.ctx, task.record_id).await?;
        Ok(json!({
            "record_id": task.record_id,
            "outcome": outcome.as_str(),
        }))
    }
}
