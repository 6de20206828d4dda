//! In-memory collaborator doubles for pipeline unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use vitrina_core::models::{MediaKind, MediaRecord};
use vitrina_core::transform::{build_transformed_url, TransformOptions};
use vitrina_core::{CatalogSource, IngestError, LegacyCatalogItem, RecordStore, UploadTaskSink};
use vitrina_storage::{RemoteFile, RemoteMediaStore, RemoteStoreError, RemoteStoreResult};

/// Record store backed by a HashMap. Mirrors the repository semantics,
/// including the first-writer-wins guard in `commit_remote`, and keeps a
/// call log so tests can assert operation ordering.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<Uuid, MediaRecord>>,
    events: Mutex<Vec<String>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, record: MediaRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn log(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: &MediaRecord) -> Result<(), IngestError> {
        self.log("insert");
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn commit_remote(
        &self,
        id: Uuid,
        remote_url: &str,
        remote_id: &str,
    ) -> Result<bool, IngestError> {
        self.log("commit_remote");
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        if record.remote_url.is_some() {
            return Ok(false);
        }
        record.remote_url = Some(remote_url.to_string());
        record.remote_id = Some(remote_id.to_string());
        Ok(true)
    }

    async fn clear_local_ref(&self, id: Uuid) -> Result<(), IngestError> {
        self.log("clear_local_ref");
        if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
            record.local_ref = None;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<MediaRecord>, IngestError> {
        self.log("delete");
        Ok(self.records.lock().unwrap().remove(&id))
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<Vec<MediaRecord>, IngestError> {
        let mut records: Vec<MediaRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.owner_id == owner_id && r.kind == kind)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(records)
    }

    async fn exists_for_owner(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
    ) -> Result<bool, IngestError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .any(|r| r.owner_id == owner_id && r.kind == kind))
    }
}

/// Remote store double that counts upload calls and can be switched into a
/// failing mode.
pub struct MockRemoteStore {
    pub upload_calls: AtomicUsize,
    response: Mutex<Result<RemoteFile, String>>,
    url_endpoint: Option<String>,
}

impl MockRemoteStore {
    pub fn succeeding(url: &str, id: &str) -> Self {
        Self {
            upload_calls: AtomicUsize::new(0),
            response: Mutex::new(Ok(RemoteFile {
                url: url.to_string(),
                id: id.to_string(),
            })),
            url_endpoint: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            upload_calls: AtomicUsize::new(0),
            response: Mutex::new(Err(message.to_string())),
            url_endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.url_endpoint = Some(endpoint.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteMediaStore for MockRemoteStore {
    async fn upload(
        &self,
        _data: Vec<u8>,
        _filename: &str,
        _folder: &str,
    ) -> RemoteStoreResult<RemoteFile> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .lock()
            .unwrap()
            .clone()
            .map_err(RemoteStoreError::UploadFailed)
    }

    fn transform_url(&self, src: &str, options: &TransformOptions) -> Option<String> {
        self.url_endpoint
            .as_deref()
            .map(|endpoint| build_transformed_url(endpoint, src, options))
    }
}

/// Task sink that records submissions without running anything.
#[derive(Default)]
pub struct RecordingSink {
    pub submitted: Mutex<Vec<(MediaKind, Uuid)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<(MediaKind, Uuid)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTaskSink for RecordingSink {
    async fn submit_upload(&self, kind: MediaKind, record_id: Uuid) -> Result<Uuid, IngestError> {
        self.submitted.lock().unwrap().push((kind, record_id));
        Ok(Uuid::new_v4())
    }
}

/// Task sink simulating an unreachable queue.
pub struct FailingSink;

#[async_trait]
impl UploadTaskSink for FailingSink {
    async fn submit_upload(
        &self,
        _kind: MediaKind,
        _record_id: Uuid,
    ) -> Result<Uuid, IngestError> {
        Err(IngestError::transient(anyhow::anyhow!(
            "queue unreachable"
        )))
    }
}

/// Static catalog view for migrator tests.
pub struct StaticCatalog {
    pub items: Vec<LegacyCatalogItem>,
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn items_with_legacy_media(&self) -> Result<Vec<LegacyCatalogItem>, IngestError> {
        Ok(self.items.clone())
    }
}
