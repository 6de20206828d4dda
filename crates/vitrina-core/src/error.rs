//! Error taxonomy for the ingestion pipeline.
//!
//! The worker retry policy distinguishes transient failures (retried with a
//! fixed delay until the budget runs out) from permanent ones (failed
//! immediately). Idempotency-guard hits are not errors; they are
//! [`IngestOutcome`] variants.

use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Non-error results of invoking the ingestion transition or orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The upload completed during this invocation.
    Uploaded,
    /// Job handed to the upload queue; completion happens later.
    Enqueued,
    /// Idempotency guard: the record already has a remote URL.
    AlreadyIngested,
    /// No local bytes to ingest; nothing to do.
    NothingToIngest,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Uploaded => "uploaded",
            IngestOutcome::Enqueued => "enqueued",
            IngestOutcome::AlreadyIngested => "already_ingested",
            IngestOutcome::NothingToIngest => "nothing_to_ingest",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Local bytes vanished before the upload. Permanent: retrying cannot help.
    #[error("local asset missing for record {0}")]
    MissingLocalAsset(Uuid),

    /// Network / remote-store error or timeout. Retried per the queue policy.
    #[error("transient upload failure: {0}")]
    TransientUpload(#[source] anyhow::Error),

    #[cfg(feature = "sqlx")]
    #[error("database error: {0}")]
    Database(#[from] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("database error: {0}")]
    Database(String),

    /// Rejected before a record exists (size, extension, content type).
    #[error("invalid asset: {0}")]
    InvalidAsset(String),

    #[error("media record not found: {0}")]
    RecordNotFound(Uuid),
}

impl IngestError {
    /// Whether the worker should retry this failure.
    ///
    /// Database errors count as transient: the claim/commit machinery is
    /// safe to re-run and a flaky connection should not burn the record.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IngestError::TransientUpload(_) | IngestError::Database(_)
        )
    }

    /// Wrap a remote-store or I/O failure as transient.
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        IngestError::TransientUpload(err.into())
    }
}
