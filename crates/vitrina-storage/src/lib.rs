//! Vitrina Storage Library
//!
//! Two storage surfaces back the ingestion pipeline:
//!
//! - **Staging**: a local filesystem area where uploaded bytes live between
//!   record creation and successful ingestion. Keys are the `local_ref`
//!   values on media records: `staging/{owner_id}/{uuid}_{filename}`.
//!   Keys must not contain `..`, `\`, or a leading `/`.
//! - **Remote**: the opaque external media store (upload + URL transform),
//!   reached over HTTP with credentials from configuration.

pub mod http;
pub mod remote;
pub mod staging;

// Re-export commonly used types
pub use http::HttpRemoteStore;
pub use remote::{RemoteFile, RemoteMediaStore, RemoteStoreError, RemoteStoreResult};
pub use staging::{StagingError, StagingResult, StagingStorage};
