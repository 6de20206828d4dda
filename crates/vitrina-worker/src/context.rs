//! Upload handler context trait
//!
//! The ingest layer implements this trait for its application context. The
//! worker holds a weak reference and calls `handle_upload` when processing
//! a claimed task; the implementation runs the ingestion transition.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use vitrina_core::models::UploadTask;

/// Context for upload task dispatch.
#[async_trait]
pub trait UploadHandlerContext: Send + Sync {
    /// Run the ingestion transition for the task's record and return a
    /// result summary for the task row.
    async fn handle_upload(self: Arc<Self>, task: &UploadTask) -> Result<serde_json::Value>;
}

/// Placeholder context used when no real context exists yet (e.g. during
/// init). Dispatch always errors.
struct NoopContext;

#[async_trait]
impl UploadHandlerContext for NoopContext {
    async fn handle_upload(self: Arc<Self>, _task: &UploadTask) -> Result<serde_json::Value> {
        Err(anyhow!("NoopContext: no handler context available"))
    }
}

/// Returns a weak reference to a no-op context. Use as placeholder when
/// building the queue before the real context exists.
pub fn empty_context_weak() -> Weak<dyn UploadHandlerContext> {
    let n: Arc<dyn UploadHandlerContext> = Arc::new(NoopContext);
    Arc::downgrade(&n)
}
