use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use vitrina_core::{CatalogSource, IngestError, LegacyCatalogItem};

/// Read-only access to the catalog's legacy single-attachment columns.
/// Only the backfill migrator uses this; the catalog itself belongs to the
/// surrounding admin system.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self))]
    pub async fn items_with_legacy_media(&self) -> Result<Vec<LegacyCatalogItem>, IngestError> {
        let items = sqlx::query_as::<Postgres, LegacyCatalogItem>(
            r#"
            SELECT id, legacy_image_ref, legacy_video_ref
            FROM catalog_items
            WHERE legacy_image_ref IS NOT NULL
                OR legacy_video_ref IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

#[async_trait]
impl CatalogSource for CatalogRepository {
    async fn items_with_legacy_media(&self) -> Result<Vec<LegacyCatalogItem>, IngestError> {
        CatalogRepository::items_with_legacy_media(self).await
    }
}
