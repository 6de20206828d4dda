//! Background upload queue and worker infrastructure for Vitrina.

pub mod context;
pub mod queue;

pub use context::{empty_context_weak, UploadHandlerContext};
pub use queue::{UploadQueue, UploadQueueConfig};
