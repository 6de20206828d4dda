use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::media::MediaKind;

/// Upload job state machine: Queued -> InFlight -> {Done | Retrying | Failed}.
/// Retrying jobs return to InFlight when re-claimed after their delay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "upload_task_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InFlight,
    Retrying,
    Done,
    Failed,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::InFlight => write!(f, "in_flight"),
            TaskStatus::Retrying => write!(f, "retrying"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "in_flight" => Ok(TaskStatus::InFlight),
            "retrying" => Ok(TaskStatus::Retrying),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// One upload job: carries the media kind and the record to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UploadTask {
    pub id: Uuid,
    pub record_id: Uuid,
    pub kind: MediaKind,
    pub status: TaskStatus,
    pub retry_count: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadTask {
    pub fn is_ready_to_run(&self) -> bool {
        matches!(self.status, TaskStatus::Queued | TaskStatus::Retrying)
            && self.scheduled_at <= Utc::now()
    }

    /// Whether another attempt is allowed. `retry_count` counts completed
    /// re-deliveries, so a freshly failed attempt has used
    /// `retry_count + 1` of the `max_attempts` budget.
    pub fn can_retry(&self) -> bool {
        self.retry_count + 1 < self.max_attempts
    }
}

/// Aggregated queue counts, exposed to operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub in_flight: i64,
    pub retrying: i64,
    pub done: i64,
    pub failed: i64,
}

impl QueueStats {
    /// Jobs waiting for a worker (queued + retrying).
    pub fn depth(&self) -> i64 {
        self.queued + self.retrying
    }
}
