//! Domain models shared across the pipeline.

pub mod media;
pub mod task;

pub use media::{MediaKind, MediaRecord};
pub use task::{QueueStats, TaskStatus, UploadTask};
