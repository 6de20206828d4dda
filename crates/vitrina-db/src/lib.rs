//! Database repositories for the ingestion pipeline.
//!
//! Each repository owns one table: media attachment records, the durable
//! upload task queue, and the read-only legacy catalog view consumed by the
//! backfill migrator. Repositories implement the collaborator traits from
//! `vitrina-core`, which is what the pipeline code is written against.

pub mod catalog;
pub mod media_record;
pub mod upload_task;

pub use catalog::CatalogRepository;
pub use media_record::MediaRecordRepository;
pub use upload_task::{UploadTaskRepository, UPLOAD_NOTIFY_CHANNEL};
