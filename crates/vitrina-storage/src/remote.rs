//! Remote media store abstraction.
//!
//! The store is an opaque external service: upload bytes, get back a URL
//! and an opaque file id; optionally rewrite URLs with transformation
//! parameters. Failures here are what the worker retry policy classifies
//! as transient.

use async_trait::async_trait;
use thiserror::Error;

use vitrina_core::transform::TransformOptions;

/// Remote store operation errors
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Upload timed out: {0}")]
    Timeout(String),

    #[error("Unexpected response from remote store: {0}")]
    InvalidResponse(String),

    #[error("Remote store not configured: {0}")]
    NotConfigured(String),
}

/// Result type for remote store operations
pub type RemoteStoreResult<T> = Result<T, RemoteStoreError>;

/// Successful upload: the durable remote reference recorded on the media record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    pub id: String,
}

/// Remote media store abstraction
///
/// Production uses the HTTP implementation; tests substitute counting
/// mocks. `upload` must be safe to call more than once with the same
/// arguments — the idempotency guard upstream makes duplicates rare, but
/// at-least-once delivery means they can happen, and the folder layout is
/// deterministic so repeats land in the same place.
#[async_trait]
pub trait RemoteMediaStore: Send + Sync {
    /// Upload a file into `folder` and return its remote reference.
    async fn upload(
        &self,
        data: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> RemoteStoreResult<RemoteFile>;

    /// Rewrite `src` with transformation parameters. Returns `None` when the
    /// rewrite capability is unavailable (endpoint not configured); callers
    /// degrade to the untransformed URL.
    fn transform_url(&self, src: &str, options: &TransformOptions) -> Option<String>;
}
