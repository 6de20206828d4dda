//! The ingestion transition: the single authoritative state change that
//! moves a media record's bytes from staging storage to the remote store.
//!
//! Both the worker and the orchestrator's synchronous path call
//! [`run_upload`]. The function is idempotent: at-least-once delivery from
//! the queue re-runs it safely, and the idempotency guard short-circuits
//! records that already committed.

use std::sync::Arc;
use uuid::Uuid;

use vitrina_core::{IngestError, IngestOutcome, RecordStore};
use vitrina_storage::{RemoteMediaStore, StagingError, StagingStorage};

/// The collaborators the transition operates on. Constructed once at
/// startup and shared by handle.
#[derive(Clone)]
pub struct IngestContext {
    pub records: Arc<dyn RecordStore>,
    pub staging: Arc<StagingStorage>,
    pub remote: Arc<dyn RemoteMediaStore>,
}

/// Execute the ingestion transition for one record.
///
/// Steps: re-check the idempotency guard, load the staged bytes, upload
/// into the record's deterministic remote folder, commit the remote
/// reference (first writer wins), then delete the staged bytes. The commit
/// is the point of no return: cleanup failures after it are logged and
/// swallowed, never propagated.
#[tracing::instrument(skip(ctx))]
pub async fn run_upload(
    ctx: &IngestContext,
    record_id: Uuid,
) -> Result<IngestOutcome, IngestError> {
    let record = ctx
        .records
        .get(record_id)
        .await?
        .ok_or(IngestError::RecordNotFound(record_id))?;

    // Idempotency guard. A leftover local_ref on a terminal record means a
    // previous attempt crashed between commit and cleanup; finish the
    // cleanup, make no remote call.
    if record.is_terminal() {
        if let Some(local_ref) = &record.local_ref {
            cleanup_local(ctx, record.id, local_ref).await;
        }
        return Ok(IngestOutcome::AlreadyIngested);
    }

    let Some(local_ref) = record.local_ref.clone() else {
        return Ok(IngestOutcome::NothingToIngest);
    };

    let data = match ctx.staging.load(&local_ref).await {
        Ok(data) => data,
        Err(StagingError::NotFound(_)) | Err(StagingError::InvalidKey(_)) => {
            return Err(IngestError::MissingLocalAsset(record.id));
        }
        Err(e) => return Err(IngestError::transient(e)),
    };

    let folder = record.remote_folder();
    let remote_file = ctx
        .remote
        .upload(data, &record.original_filename, &folder)
        .await
        .map_err(IngestError::transient)?;

    // Point of no return: once this commits the record is terminal, even if
    // the process dies before the cleanup below runs.
    let committed = ctx
        .records
        .commit_remote(record.id, &remote_file.url, &remote_file.id)
        .await?;
    if !committed {
        // Another writer got there first; its reference stands and this
        // upload's copy is simply unreferenced.
        tracing::debug!(
            record_id = %record.id,
            "Remote reference already committed by another writer"
        );
    }

    cleanup_local(ctx, record.id, &local_ref).await;

    Ok(IngestOutcome::Uploaded)
}

/// Delete staged bytes and clear the record's `local_ref`. Failures leave a
/// dangling staging file, which is harmless; the local_ref is kept so a
/// later guard hit can retry the cleanup.
async fn cleanup_local(ctx: &IngestContext, record_id: Uuid, local_ref: &str) {
    if let Err(e) = ctx.staging.delete(local_ref).await {
        tracing::warn!(
            error = %e,
            record_id = %record_id,
            local_ref = %local_ref,
            "Failed to delete staged bytes after ingestion"
        );
        return;
    }

    if let Err(e) = ctx.records.clear_local_ref(record_id).await {
        tracing::warn!(
            error = %e,
            record_id = %record_id,
            "Failed to clear local_ref after staging cleanup"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryRecordStore, MockRemoteStore};
    use async_trait::async_trait;
    use tempfile::tempdir;
    use vitrina_core::models::{MediaKind, MediaRecord};

    async fn staging(dir: &tempfile::TempDir) -> Arc<StagingStorage> {
        Arc::new(
            StagingStorage::new(dir.path(), "http://localhost:4000/staging".to_string())
                .await
                .unwrap(),
        )
    }

    async fn staged_record(
        records: &InMemoryRecordStore,
        staging: &StagingStorage,
        data: &[u8],
    ) -> MediaRecord {
        let owner_id = Uuid::new_v4();
        let key = staging.stage(owner_id, "photo.jpg", data).await.unwrap();
        let record = MediaRecord::new_local(
            owner_id,
            MediaKind::Image,
            "photo.jpg".to_string(),
            key,
            0,
            true,
        );
        records.seed(record.clone()).await;
        record
    }

    #[tokio::test]
    async fn uploads_commits_and_cleans_up() {
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1"));

        let record = staged_record(&records, &staging, b"abc").await;
        let local_ref = record.local_ref.clone().unwrap();

        let ctx = IngestContext {
            records: records.clone(),
            staging: staging.clone(),
            remote: remote.clone(),
        };

        let outcome = run_upload(&ctx, record.id).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Uploaded);
        assert_eq!(remote.calls(), 1);

        let stored = records.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.remote_url.as_deref(), Some("https://cdn/x"));
        assert_eq!(stored.remote_id.as_deref(), Some("f1"));
        assert_eq!(stored.local_ref, None);
        assert!(!staging.exists(&local_ref).await.unwrap());
    }

    #[tokio::test]
    async fn remote_commit_happens_before_local_cleanup() {
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1"));

        let record = staged_record(&records, &staging, b"abc").await;

        let ctx = IngestContext {
            records: records.clone(),
            staging,
            remote,
        };
        run_upload(&ctx, record.id).await.unwrap();

        let events = records.events();
        let commit_pos = events.iter().position(|e| e == "commit_remote").unwrap();
        let clear_pos = events.iter().position(|e| e == "clear_local_ref").unwrap();
        assert!(commit_pos < clear_pos);
    }

    #[tokio::test]
    async fn second_invocation_makes_no_remote_call() {
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1"));

        let record = staged_record(&records, &staging, b"abc").await;

        let ctx = IngestContext {
            records: records.clone(),
            staging,
            remote: remote.clone(),
        };

        assert_eq!(
            run_upload(&ctx, record.id).await.unwrap(),
            IngestOutcome::Uploaded
        );
        let after_first = records.get(record.id).await.unwrap().unwrap();

        assert_eq!(
            run_upload(&ctx, record.id).await.unwrap(),
            IngestOutcome::AlreadyIngested
        );
        assert_eq!(remote.calls(), 1);

        let after_second = records.get(record.id).await.unwrap().unwrap();
        assert_eq!(after_first.remote_url, after_second.remote_url);
        assert_eq!(after_first.remote_id, after_second.remote_id);
    }

    #[tokio::test]
    async fn terminal_record_with_leftover_bytes_gets_cleaned() {
        // Simulates a crash between commit and cleanup: the record is
        // terminal but the staging bytes and local_ref are still there.
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1"));

        let mut record = staged_record(&records, &staging, b"abc").await;
        let local_ref = record.local_ref.clone().unwrap();
        record.remote_url = Some("https://cdn/earlier".to_string());
        record.remote_id = Some("f0".to_string());
        records.seed(record.clone()).await;

        let ctx = IngestContext {
            records: records.clone(),
            staging: staging.clone(),
            remote: remote.clone(),
        };

        let outcome = run_upload(&ctx, record.id).await.unwrap();
        assert_eq!(outcome, IngestOutcome::AlreadyIngested);
        assert_eq!(remote.calls(), 0);

        let stored = records.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.remote_url.as_deref(), Some("https://cdn/earlier"));
        assert_eq!(stored.local_ref, None);
        assert!(!staging.exists(&local_ref).await.unwrap());
    }

    #[tokio::test]
    async fn inert_record_is_nothing_to_ingest() {
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1"));

        let mut record = staged_record(&records, &staging, b"abc").await;
        record.local_ref = None;
        records.seed(record.clone()).await;

        let ctx = IngestContext {
            records,
            staging,
            remote: remote.clone(),
        };

        let outcome = run_upload(&ctx, record.id).await.unwrap();
        assert_eq!(outcome, IngestOutcome::NothingToIngest);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn missing_staged_bytes_is_permanent_failure() {
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1"));

        let record = MediaRecord::new_local(
            Uuid::new_v4(),
            MediaKind::Image,
            "photo.jpg".to_string(),
            "staging/gone/photo.jpg".to_string(),
            0,
            false,
        );
        records.seed(record.clone()).await;

        let ctx = IngestContext {
            records,
            staging,
            remote: remote.clone(),
        };

        let err = run_upload(&ctx, record.id).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingLocalAsset(id) if id == record.id));
        assert!(!err.is_transient());
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn transient_remote_failure_preserves_local_bytes() {
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::failing("503 from remote store"));

        let record = staged_record(&records, &staging, b"abc").await;
        let local_ref = record.local_ref.clone().unwrap();

        let ctx = IngestContext {
            records: records.clone(),
            staging: staging.clone(),
            remote: remote.clone(),
        };

        let err = run_upload(&ctx, record.id).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(remote.calls(), 1);

        // The record and its bytes are untouched, ready for a retry.
        let stored = records.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.remote_url, None);
        assert_eq!(stored.local_ref.as_deref(), Some(local_ref.as_str()));
        assert!(staging.exists(&local_ref).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let dir = tempdir().unwrap();
        let ctx = IngestContext {
            records: Arc::new(InMemoryRecordStore::new()),
            staging: staging(&dir).await,
            remote: Arc::new(MockRemoteStore::succeeding("https://cdn/x", "f1")),
        };

        let id = Uuid::new_v4();
        let err = run_upload(&ctx, id).await.unwrap_err();
        assert!(matches!(err, IngestError::RecordNotFound(got) if got == id));
    }

    /// Record store that lets a competing writer commit between the
    /// transition's read and its own commit.
    struct RacingRecordStore {
        inner: Arc<InMemoryRecordStore>,
    }

    #[async_trait]
    impl RecordStore for RacingRecordStore {
        async fn insert(&self, record: &MediaRecord) -> Result<(), IngestError> {
            self.inner.insert(record).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
            self.inner.get(id).await
        }

        async fn commit_remote(
            &self,
            id: Uuid,
            remote_url: &str,
            remote_id: &str,
        ) -> Result<bool, IngestError> {
            // The competing worker wins the race just before our commit.
            self.inner
                .commit_remote(id, "https://cdn/winner", "w1")
                .await?;
            self.inner.commit_remote(id, remote_url, remote_id).await
        }

        async fn clear_local_ref(&self, id: Uuid) -> Result<(), IngestError> {
            self.inner.clear_local_ref(id).await
        }

        async fn delete(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
            self.inner.delete(id).await
        }

        async fn list_for_owner(
            &self,
            owner_id: Uuid,
            kind: MediaKind,
        ) -> Result<Vec<MediaRecord>, IngestError> {
            self.inner.list_for_owner(owner_id, kind).await
        }

        async fn exists_for_owner(
            &self,
            owner_id: Uuid,
            kind: MediaKind,
        ) -> Result<bool, IngestError> {
            self.inner.exists_for_owner(owner_id, kind).await
        }
    }

    #[tokio::test]
    async fn losing_the_commit_race_is_still_success() {
        let dir = tempdir().unwrap();
        let staging = staging(&dir).await;
        let inner = Arc::new(InMemoryRecordStore::new());
        let remote = Arc::new(MockRemoteStore::succeeding("https://cdn/loser", "l1"));

        let record = staged_record(&inner, &staging, b"abc").await;
        let local_ref = record.local_ref.clone().unwrap();

        let ctx = IngestContext {
            records: Arc::new(RacingRecordStore {
                inner: inner.clone(),
            }),
            staging: staging.clone(),
            remote,
        };

        let outcome = run_upload(&ctx, record.id).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Uploaded);

        // First writer wins; the loser's URL never overwrites it.
        let stored = inner.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.remote_url.as_deref(), Some("https://cdn/winner"));
        assert_eq!(stored.remote_id.as_deref(), Some("w1"));

        // Cleanup still ran.
        assert_eq!(stored.local_ref, None);
        assert!(!staging.exists(&local_ref).await.unwrap());
    }
}
