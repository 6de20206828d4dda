use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use vitrina_core::models::{MediaKind, QueueStats, UploadTask};
use vitrina_core::{IngestError, UploadTaskSink};

/// Channel name for PostgreSQL LISTEN/NOTIFY when an upload task is created.
pub const UPLOAD_NOTIFY_CHANNEL: &str = "vitrina_new_upload";

const TASK_COLUMNS: &str = r#"
    id,
    record_id,
    kind,
    status,
    retry_count,
    max_attempts,
    scheduled_at,
    started_at,
    completed_at,
    last_error,
    created_at,
    updated_at
"#;

/// Repository for the durable upload task queue.
///
/// The queue is the sole serialization point per record: claiming uses
/// `FOR UPDATE SKIP LOCKED` inside a transaction, so each job is held by at
/// most one worker at a time.
#[derive(Clone)]
pub struct UploadTaskRepository {
    pool: PgPool,
    default_max_attempts: i32,
}

impl UploadTaskRepository {
    pub fn new(pool: PgPool, default_max_attempts: i32) -> Self {
        Self {
            pool,
            default_max_attempts,
        }
    }

    /// Create a new upload task and notify waiting workers.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(
        &self,
        kind: MediaKind,
        record_id: Uuid,
        max_attempts: i32,
    ) -> Result<UploadTask, IngestError> {
        let mut tx = self.pool.begin().await?;

        let task = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            INSERT INTO upload_tasks (record_id, kind, status, max_attempts, scheduled_at)
            VALUES ($1, $2, 'queued', $3, NOW())
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(record_id)
        .bind(kind)
        .bind(max_attempts)
        .fetch_one(&mut *tx)
        .await?;

        // Wake workers immediately instead of waiting for the poll interval.
        // Non-fatal: workers fall back to polling if NOTIFY fails.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(UPLOAD_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %task.id,
                "Failed to send pg_notify for new upload task, workers will discover it via polling"
            );
        }

        tx.commit().await?;

        tracing::info!(
            task_id = %task.id,
            record_id = %record_id,
            kind = %kind,
            "Upload task queued"
        );

        Ok(task)
    }

    /// Atomically claim the next runnable task (Queued or Retrying with a
    /// due `scheduled_at`), moving it to InFlight.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next_task(&self) -> Result<Option<UploadTask>, IngestError> {
        let mut tx = self.pool.begin().await?;

        let task = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            SELECT {}
            FROM upload_tasks
            WHERE status IN ('queued', 'retrying')
                AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
            TASK_COLUMNS
        ))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(task) = task else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let claimed = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            UPDATE upload_tasks
            SET status = 'in_flight',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            task_id = %claimed.id,
            record_id = %claimed.record_id,
            retry_count = claimed.retry_count,
            "Upload task claimed"
        );

        Ok(Some(claimed))
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_done(&self, task_id: Uuid) -> Result<UploadTask, IngestError> {
        let task = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            UPDATE upload_tasks
            SET status = 'done',
                completed_at = NOW(),
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(task_id = %task_id, record_id = %task.record_id, "Upload task done");

        Ok(task)
    }

    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed(
        &self,
        task_id: Uuid,
        error: serde_json::Value,
    ) -> Result<UploadTask, IngestError> {
        let task = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            UPDATE upload_tasks
            SET status = 'failed',
                completed_at = NOW(),
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;

        tracing::error!(
            task_id = %task_id,
            record_id = %task.record_id,
            retry_count = task.retry_count,
            "Upload task failed"
        );

        Ok(task)
    }

    /// Re-enqueue after a transient failure: bump the retry count and push
    /// `scheduled_at` out by the fixed delay.
    #[tracing::instrument(skip(self, error))]
    pub async fn schedule_retry(
        &self,
        task_id: Uuid,
        delay_secs: u64,
        error: serde_json::Value,
    ) -> Result<UploadTask, IngestError> {
        let task = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            UPDATE upload_tasks
            SET status = 'retrying',
                retry_count = retry_count + 1,
                scheduled_at = NOW() + ($2 * interval '1 second'),
                started_at = NULL,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(delay_secs as i64)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_attempts = task.max_attempts,
            delay_secs = delay_secs,
            "Upload task retry scheduled"
        );

        Ok(task)
    }

    /// Return in-flight tasks whose worker died back to the queue. A task is
    /// stale when it has been in flight longer than `older_than_secs`
    /// (task timeout plus grace period at the call site). Safe because the
    /// ingestion transition is idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale_in_flight(&self, older_than_secs: i64) -> Result<u64, IngestError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_tasks
            SET status = 'queued',
                started_at = NULL,
                updated_at = NOW()
            WHERE status = 'in_flight'
                AND started_at < NOW() - ($1 * interval '1 second')
            "#,
        )
        .bind(older_than_secs)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count = count, "Requeued stale in-flight upload tasks");
        }

        Ok(count)
    }

    /// Aggregated queue counts for operational tooling.
    #[tracing::instrument(skip(self))]
    pub async fn get_stats(&self) -> Result<QueueStats, IngestError> {
        use sqlx::Row;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'queued') as queued,
                COUNT(*) FILTER (WHERE status = 'in_flight') as in_flight,
                COUNT(*) FILTER (WHERE status = 'retrying') as retrying,
                COUNT(*) FILTER (WHERE status = 'done') as done,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM upload_tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            queued: row.get::<Option<i64>, _>("queued").unwrap_or(0),
            in_flight: row.get::<Option<i64>, _>("in_flight").unwrap_or(0),
            retrying: row.get::<Option<i64>, _>("retrying").unwrap_or(0),
            done: row.get::<Option<i64>, _>("done").unwrap_or(0),
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0),
        })
    }

    /// Requeue a failed task for another round of attempts (operator action).
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed_task(&self, task_id: Uuid) -> Result<UploadTask, IngestError> {
        let task = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            UPDATE upload_tasks
            SET status = 'queued',
                retry_count = 0,
                started_at = NULL,
                completed_at = NULL,
                last_error = NULL,
                scheduled_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
                AND status = 'failed'
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(task_id = %task_id, "Failed upload task manually requeued");

        Ok(task)
    }

    /// Delete finished tasks (done, failed) older than the given number of
    /// days. Returns the number of rows deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_old_finished_tasks(&self, older_than_days: i32) -> Result<u64, IngestError> {
        use sqlx::Row;

        let result = sqlx::query(
            r#"
            WITH deleted AS (
                DELETE FROM upload_tasks
                WHERE status IN ('done', 'failed')
                    AND COALESCE(completed_at, updated_at) < NOW() - ($1 * interval '1 day')
                RETURNING id
            )
            SELECT COUNT(*)::bigint FROM deleted
            "#,
        )
        .bind(older_than_days)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = result.get(0);
        let count = count.max(0) as u64;

        if count > 0 {
            tracing::info!(
                count = count,
                older_than_days = older_than_days,
                "Deleted old finished upload tasks"
            );
        }

        Ok(count)
    }
}

#[async_trait]
impl UploadTaskSink for UploadTaskRepository {
    async fn submit_upload(&self, kind: MediaKind, record_id: Uuid) -> Result<Uuid, IngestError> {
        let task = self
            .create_task(kind, record_id, self.default_max_attempts)
            .await?;
        Ok(task.id)
    }
}

// TaskStatus is kept in sync with the upload_task_status enum in the
// migrations; the string forms below are what the SQL above matches on.
#[cfg(test)]
mod tests {
    use vitrina_core::models::TaskStatus;

    #[test]
    fn status_strings_match_sql_literals() {
        assert_eq!(TaskStatus::Queued.to_string(), "queued");
        assert_eq!(TaskStatus::InFlight.to_string(), "in_flight");
        assert_eq!(TaskStatus::Retrying.to_string(), "retrying");
        assert_eq!(TaskStatus::Done.to_string(), "done");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }
}
