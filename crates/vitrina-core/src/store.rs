//! Collaborator traits the pipeline is written against.
//!
//! The ingestion transition, orchestrator, and migrator only see these
//! seams; the sqlx repositories in `vitrina-db` implement them for
//! production and the tests substitute in-memory doubles.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::IngestError;
use crate::models::{MediaKind, MediaRecord};

/// Persistence seam for media records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &MediaRecord) -> Result<(), IngestError>;

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError>;

    /// Persist `remote_url`/`remote_id` for a record that does not have them
    /// yet. Returns `false` when the guard lost — another writer already
    /// committed remote fields — which callers treat as success.
    async fn commit_remote(
        &self,
        id: Uuid,
        remote_url: &str,
        remote_id: &str,
    ) -> Result<bool, IngestError>;

    /// Clear `local_ref` after the staging bytes are gone.
    async fn clear_local_ref(&self, id: Uuid) -> Result<(), IngestError>;

    /// Remove the record, returning it so the caller can clean up any
    /// staging bytes it still referenced.
    async fn delete(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError>;

    /// Records for one owner and kind, ordered by `sort_order` then recency.
    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<Vec<MediaRecord>, IngestError>;

    async fn exists_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<bool, IngestError>;
}

/// Enqueue seam used by the orchestrator. Submission failure triggers the
/// synchronous fallback, so implementations should report errors rather
/// than retry internally.
#[async_trait]
pub trait UploadTaskSink: Send + Sync {
    async fn submit_upload(&self, kind: MediaKind, record_id: Uuid) -> Result<Uuid, IngestError>;
}

/// A catalog item still carrying legacy single-attachment fields.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LegacyCatalogItem {
    pub id: Uuid,
    /// Staging key of the legacy image attachment, if any.
    pub legacy_image_ref: Option<String>,
    /// Staging key of the legacy video attachment, if any.
    pub legacy_video_ref: Option<String>,
}

/// Read-only view of the catalog used by the backfill migrator.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// All items that still have a legacy image or video attachment.
    async fn items_with_legacy_media(&self) -> Result<Vec<LegacyCatalogItem>, IngestError>;
}
