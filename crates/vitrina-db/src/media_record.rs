use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use vitrina_core::models::{MediaKind, MediaRecord};
use vitrina_core::{IngestError, RecordStore};

const RECORD_COLUMNS: &str = r#"
    id,
    owner_id,
    kind,
    original_filename,
    local_ref,
    remote_url,
    remote_id,
    is_primary,
    sort_order,
    created_at,
    updated_at
"#;

/// Repository for media attachment records.
#[derive(Clone)]
pub struct MediaRecordRepository {
    pool: PgPool,
}

impl MediaRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, record), fields(record_id = %record.id, owner_id = %record.owner_id, kind = %record.kind))]
    pub async fn insert(&self, record: &MediaRecord) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            INSERT INTO media_records (
                id, owner_id, kind, original_filename, local_ref,
                remote_url, remote_id, is_primary, sort_order,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(record.kind)
        .bind(&record.original_filename)
        .bind(record.local_ref.as_deref())
        .bind(record.remote_url.as_deref())
        .bind(record.remote_id.as_deref())
        .bind(record.is_primary)
        .bind(record.sort_order)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Media record created");

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
        let record = sqlx::query_as::<Postgres, MediaRecord>(&format!(
            "SELECT {} FROM media_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Persist the remote reference. The `remote_url IS NULL` predicate is
    /// the idempotency guard re-checked inside the commit itself: the first
    /// writer wins, later writers see zero rows affected.
    #[tracing::instrument(skip(self, remote_url, remote_id))]
    pub async fn commit_remote(
        &self,
        id: Uuid,
        remote_url: &str,
        remote_id: &str,
    ) -> Result<bool, IngestError> {
        let result = sqlx::query(
            r#"
            UPDATE media_records
            SET remote_url = $2,
                remote_id = $3,
                updated_at = NOW()
            WHERE id = $1
                AND remote_url IS NULL
            "#,
        )
        .bind(id)
        .bind(remote_url)
        .bind(remote_id)
        .execute(&self.pool)
        .await?;

        let committed = result.rows_affected() == 1;
        if committed {
            tracing::info!(record_id = %id, "Remote reference committed");
        } else {
            tracing::debug!(record_id = %id, "Remote reference already present, commit skipped");
        }

        Ok(committed)
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_local_ref(&self, id: Uuid) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            UPDATE media_records
            SET local_ref = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
        let record = sqlx::query_as::<Postgres, MediaRecord>(&format!(
            "DELETE FROM media_records WHERE id = $1 RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if record.is_some() {
            tracing::info!(record_id = %id, "Media record deleted");
        }

        Ok(record)
    }

    /// Sibling records for one owner and kind, display order: `sort_order`
    /// ascending, newest first within equal orders.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<Vec<MediaRecord>, IngestError> {
        let records = sqlx::query_as::<Postgres, MediaRecord>(&format!(
            r#"
            SELECT {}
            FROM media_records
            WHERE owner_id = $1 AND kind = $2
            ORDER BY sort_order ASC, created_at DESC
            "#,
            RECORD_COLUMNS
        ))
        .bind(owner_id)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<bool, IngestError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM media_records
                WHERE owner_id = $1 AND kind = $2
            )
            "#,
        )
        .bind(owner_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl RecordStore for MediaRecordRepository {
    async fn insert(&self, record: &MediaRecord) -> Result<(), IngestError> {
        MediaRecordRepository::insert(self, record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
        MediaRecordRepository::get(self, id).await
    }

    async fn commit_remote(
        &self,
        id: Uuid,
        remote_url: &str,
        remote_id: &str,
    ) -> Result<bool, IngestError> {
        MediaRecordRepository::commit_remote(self, id, remote_url, remote_id).await
    }

    async fn clear_local_ref(&self, id: Uuid) -> Result<(), IngestError> {
        MediaRecordRepository::clear_local_ref(self, id).await
    }

    async fn delete(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
        MediaRecordRepository::delete(self, id).await
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<Vec<MediaRecord>, IngestError> {
        MediaRecordRepository::list_for_owner(self, owner_id, kind).await
    }

    async fn exists_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<bool, IngestError> {
        MediaRecordRepository::exists_for_owner(self, owner_id, kind).await
    }
}
