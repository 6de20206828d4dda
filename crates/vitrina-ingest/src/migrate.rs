//! Backfill migrator: converts legacy single-attachment catalog fields into
//! media records and feeds them through the standard ingestion path.
//!
//! One-shot and safe to re-run: items that already have a record of the
//! corresponding kind (even one still mid-ingestion) are skipped, so a
//! second run creates nothing.

use serde::Serialize;
use std::sync::Arc;

use vitrina_core::models::{MediaKind, MediaRecord};
use vitrina_core::{CatalogSource, IngestError, LegacyCatalogItem, RecordStore};

use crate::orchestrator::IngestionOrchestrator;

/// Batch result reported to the operator.
#[derive(Debug, Default, Serialize)]
pub struct MigrationSummary {
    pub images_migrated: u64,
    pub videos_migrated: u64,
    pub failures: Vec<String>,
}

pub struct BackfillMigrator {
    catalog: Arc<dyn CatalogSource>,
    records: Arc<dyn RecordStore>,
    orchestrator: Arc<IngestionOrchestrator>,
}

impl BackfillMigrator {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        records: Arc<dyn RecordStore>,
        orchestrator: Arc<IngestionOrchestrator>,
    ) -> Self {
        Self {
            catalog,
            records,
            orchestrator,
        }
    }

    /// Walk all legacy items. Per-item failures are collected in the
    /// summary; they do not abort the batch.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<MigrationSummary, IngestError> {
        let items = self.catalog.items_with_legacy_media().await?;
        let mut summary = MigrationSummary::default();

        tracing::info!(items = items.len(), "Backfill migration started");

        for item in items {
            if let Some(legacy_ref) = item.legacy_image_ref.clone() {
                match self.migrate_one(&item, MediaKind::Image, &legacy_ref).await {
                    Ok(true) => summary.images_migrated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            item_id = %item.id,
                            error = %e,
                            "Failed to migrate legacy image"
                        );
                        summary
                            .failures
                            .push(format!("item {} image: {}", item.id, e));
                    }
                }
            }

            if let Some(legacy_ref) = item.legacy_video_ref.clone() {
                match self.migrate_one(&item, MediaKind::Video, &legacy_ref).await {
                    Ok(true) => summary.videos_migrated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            item_id = %item.id,
                            error = %e,
                            "Failed to migrate legacy video"
                        );
                        summary
                            .failures
                            .push(format!("item {} video: {}", item.id, e));
                    }
                }
            }
        }

        tracing::info!(
            images_migrated = summary.images_migrated,
            videos_migrated = summary.videos_migrated,
            failures = summary.failures.len(),
            "Backfill migration finished"
        );

        Ok(summary)
    }

    /// Create a record for one legacy attachment and ingest it. Returns
    /// `false` when the item already has a record of this kind.
    async fn migrate_one(
        &self,
        item: &LegacyCatalogItem,
        kind: MediaKind,
        legacy_ref: &str,
    ) -> Result<bool, IngestError> {
        if self.records.exists_for_owner(item.id, kind).await? {
            return Ok(false);
        }

        let filename = legacy_ref
            .rsplit('/')
            .next()
            .unwrap_or(legacy_ref)
            .to_string();

        // The record points at the legacy staging bytes directly; ingestion
        // consumes and removes them, which is the cleanup the migration is for.
        let record =
            MediaRecord::new_local(item.id, kind, filename, legacy_ref.to_string(), 0, true);
        self.records.insert(&record).await?;
        self.orchestrator.ingest(&record).await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryRecordStore, MockRemoteStore, RecordingSink, StaticCatalog};
    use crate::transition::IngestContext;
    use tempfile::tempdir;
    use uuid::Uuid;
    use vitrina_storage::StagingStorage;

    struct Harness {
        records: Arc<InMemoryRecordStore>,
        staging: Arc<StagingStorage>,
        remote: Arc<MockRemoteStore>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = tempdir().unwrap();
            let staging = Arc::new(
                StagingStorage::new(dir.path(), "http://localhost:4000/staging".to_string())
                    .await
                    .unwrap(),
            );
            Self {
                records: Arc::new(InMemoryRecordStore::new()),
                staging,
                remote: Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1")),
                _dir: dir,
            }
        }

        fn migrator(&self, catalog: StaticCatalog, upload_async: bool) -> BackfillMigrator {
            let ctx = IngestContext {
                records: self.records.clone(),
                staging: self.staging.clone(),
                remote: self.remote.clone(),
            };
            let orchestrator = Arc::new(IngestionOrchestrator::new(
                ctx,
                Arc::new(RecordingSink::new()),
                upload_async,
            ));
            BackfillMigrator::new(
                Arc::new(catalog),
                self.records.clone(),
                orchestrator,
            )
        }
    }

    #[tokio::test]
    async fn migrates_legacy_image_exactly_once() {
        let h = Harness::new().await;
        let item_id = Uuid::new_v4();
        let key = h
            .staging
            .stage(item_id, "legacy.jpg", b"legacy bytes")
            .await
            .unwrap();

        let catalog = || StaticCatalog {
            items: vec![LegacyCatalogItem {
                id: item_id,
                legacy_image_ref: Some(key.clone()),
                legacy_video_ref: None,
            }],
        };

        let migrator = h.migrator(catalog(), false);
        let summary = migrator.run().await.unwrap();
        assert_eq!(summary.images_migrated, 1);
        assert_eq!(summary.videos_migrated, 0);
        assert!(summary.failures.is_empty());

        let records = h
            .records
            .list_for_owner(item_id, MediaKind::Image)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_primary);
        assert_eq!(records[0].remote_url.as_deref(), Some("https://cdn/x"));
        assert_eq!(records[0].original_filename.ends_with("legacy.jpg"), true);

        // Second run over the same catalog creates nothing new.
        let migrator = h.migrator(catalog(), false);
        let summary = migrator.run().await.unwrap();
        assert_eq!(summary.images_migrated, 0);
        assert!(summary.failures.is_empty());

        let records = h
            .records
            .list_for_owner(item_id, MediaKind::Image)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(h.remote.calls(), 1);
    }

    #[tokio::test]
    async fn migrates_image_and_video_for_one_item() {
        let h = Harness::new().await;
        let item_id = Uuid::new_v4();
        let image_key = h.staging.stage(item_id, "a.jpg", b"img").await.unwrap();
        let video_key = h.staging.stage(item_id, "a.mp4", b"vid").await.unwrap();

        let migrator = h.migrator(
            StaticCatalog {
                items: vec![LegacyCatalogItem {
                    id: item_id,
                    legacy_image_ref: Some(image_key),
                    legacy_video_ref: Some(video_key),
                }],
            },
            false,
        );

        let summary = migrator.run().await.unwrap();
        assert_eq!(summary.images_migrated, 1);
        assert_eq!(summary.videos_migrated, 1);
        assert!(h
            .records
            .exists_for_owner(item_id, MediaKind::Video)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn per_item_failures_do_not_abort_the_batch() {
        let h = Harness::new().await;

        let broken_item = Uuid::new_v4();
        let healthy_item = Uuid::new_v4();
        let healthy_key = h
            .staging
            .stage(healthy_item, "ok.jpg", b"bytes")
            .await
            .unwrap();

        let migrator = h.migrator(
            StaticCatalog {
                items: vec![
                    LegacyCatalogItem {
                        id: broken_item,
                        // Legacy file is gone: sync ingestion fails permanently.
                        legacy_image_ref: Some("staging/gone/void.jpg".to_string()),
                        legacy_video_ref: None,
                    },
                    LegacyCatalogItem {
                        id: healthy_item,
                        legacy_image_ref: Some(healthy_key),
                        legacy_video_ref: None,
                    },
                ],
            },
            false,
        );

        let summary = migrator.run().await.unwrap();
        assert_eq!(summary.images_migrated, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].contains(&broken_item.to_string()));

        let healthy = h
            .records
            .list_for_owner(healthy_item, MediaKind::Image)
            .await
            .unwrap();
        assert_eq!(healthy[0].remote_url.as_deref(), Some("https://cdn/x"));
    }
}
