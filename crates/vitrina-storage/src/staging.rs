use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use vitrina_core::validation::sanitize_filename;

/// Staging storage errors
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid staging key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for staging operations
pub type StagingResult<T> = Result<T, StagingError>;

/// Local filesystem staging area for uploaded bytes awaiting ingestion.
///
/// Keys have the form `staging/{owner_id}/{uuid}_{filename}` and are the
/// `local_ref` values stored on media records. Deletion is idempotent:
/// removing a key that is already gone succeeds, which is what the
/// ingestion transition's cleanup step relies on.
#[derive(Clone)]
pub struct StagingStorage {
    base_path: PathBuf,
    base_url: String,
}

impl StagingStorage {
    /// Create a new StagingStorage instance.
    ///
    /// # Arguments
    /// * `base_path` - Root directory for staged files (e.g., "/var/lib/vitrina/staging")
    /// * `base_url` - Base URL for serving staged files during review
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StagingResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StagingError::ConfigError(format!(
                "Failed to create staging directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(StagingStorage {
            base_path,
            base_url,
        })
    }

    /// Convert a staging key to a filesystem path, rejecting keys that could
    /// escape the staging directory.
    fn key_to_path(&self, key: &str) -> StagingResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.contains('\\') {
            return Err(StagingError::InvalidKey(
                "Staging key contains invalid characters".to_string(),
            ));
        }
        Ok(self.base_path.join(key))
    }

    fn generate_key(owner_id: Uuid, filename: &str) -> String {
        format!(
            "staging/{}/{}_{}",
            owner_id,
            Uuid::new_v4(),
            sanitize_filename(filename)
        )
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StagingResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Stage uploaded bytes and return the staging key.
    pub async fn stage(
        &self,
        owner_id: Uuid,
        filename: &str,
        data: &[u8],
    ) -> StagingResult<String> {
        let key = Self::generate_key(owner_id, filename);
        let path = self.key_to_path(&key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StagingError::WriteFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(data).await.map_err(|e| {
            StagingError::WriteFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StagingError::WriteFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Staged local bytes"
        );

        Ok(key)
    }

    /// Load staged bytes by key.
    pub async fn load(&self, key: &str) -> StagingResult<Vec<u8>> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StagingError::NotFound(key.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StagingError::ReadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        Ok(data)
    }

    /// Delete staged bytes. Succeeds when the key is already gone.
    pub async fn delete(&self, key: &str) -> StagingResult<()> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StagingError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(key = %key, "Deleted staged bytes");

        Ok(())
    }

    pub async fn exists(&self, key: &str) -> StagingResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Public URL for a staged file (used by admin previews before ingestion).
    pub fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}
