//! Upload queue: worker pool, LISTEN/NOTIFY or polling, retry, and claiming.
//!
//! Shutdown: [`UploadQueue::shutdown`] signals the pool to stop; it does not
//! wait for in-flight tasks. In-flight claims that die with the process are
//! returned to the queue by the stale-task reaper, and the idempotent
//! transition makes redelivery safe.

use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use vitrina_core::models::UploadTask;
use vitrina_core::IngestError;
use vitrina_db::{UploadTaskRepository, UPLOAD_NOTIFY_CHANNEL};

use crate::context::UploadHandlerContext;

#[derive(Clone)]
pub struct UploadQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Per-task timeout on the remote call; expiry is classified transient.
    pub task_timeout_secs: u64,
    /// Fixed delay between retry attempts.
    pub retry_delay_secs: u64,
    /// Interval in seconds between runs of the stale task reaper. 0 = disabled.
    pub stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to the task timeout before reaping
    /// stale in-flight tasks.
    pub stale_task_grace_period_secs: i64,
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            task_timeout_secs: 600,
            retry_delay_secs: 10,
            stale_task_reap_interval_secs: 60,
            stale_task_grace_period_secs: 300,
        }
    }
}

/// Whether a handler failure should be retried. Unknown error types count
/// as transient, matching the claim machinery being safe to re-run; only an
/// explicit permanent classification skips the retry budget.
fn is_transient_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<IngestError>()
        .map(|e| e.is_transient())
        .unwrap_or(true)
}

pub struct UploadQueue {
    repository: UploadTaskRepository,
    config: UploadQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl UploadQueue {
    /// Create a new UploadQueue with a weak reference to the dispatch context.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake
    /// immediately when tasks are created, in addition to polling at
    /// `poll_interval_ms`. If `pool` is `None`, only polling is used.
    pub fn new(
        repository: UploadTaskRepository,
        config: UploadQueueConfig,
        context: Weak<dyn UploadHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let repo_clone = repository.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(repo_clone, config_clone, context, shutdown_rx, pool).await;
        });

        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    /// Aggregated queue counts for operational tooling.
    pub async fn stats(&self) -> Result<vitrina_core::models::QueueStats, IngestError> {
        self.repository.get_stats().await
    }

    async fn worker_pool(
        repository: UploadTaskRepository,
        config: UploadQueueConfig,
        context: Weak<dyn UploadHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Upload queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(UPLOAD_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Spawn stale task reaper (if interval > 0)
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.stale_task_reap_interval_secs > 0 {
            let repo_for_reaper = repository.clone();
            let reap_interval = Duration::from_secs(config.stale_task_reap_interval_secs);
            let stale_after =
                config.task_timeout_secs as i64 + config.stale_task_grace_period_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = repo_for_reaper.reap_stale_in_flight(stale_after).await {
                                tracing::error!(error = %e, "Stale task reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Upload queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&repository, &config, &semaphore, &context).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&repository, &config, &semaphore, &context).await;
                }
            }
        }

        tracing::info!("Upload queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        repository: &UploadTaskRepository,
        config: &UploadQueueConfig,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn UploadHandlerContext>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match repository.claim_next_task().await {
            Ok(Some(task)) => {
                let repo = repository.clone();
                let cfg = config.clone();
                let ctx = context.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_task(task, repo, cfg, ctx).await {
                        tracing::error!(error = %e, "Upload task processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No upload tasks available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim upload task from queue");
            }
        }
    }

    #[tracing::instrument(skip(repository, config, context), fields(task.id = %task.id, task.record_id = %task.record_id, task.kind = %task.kind))]
    async fn process_task(
        task: UploadTask,
        repository: UploadTaskRepository,
        config: UploadQueueConfig,
        context: Weak<dyn UploadHandlerContext>,
    ) -> Result<()> {
        let ctx = context.upgrade().ok_or_else(|| {
            anyhow::anyhow!("UploadHandlerContext was dropped, cannot process task")
        })?;

        let timeout_duration = Duration::from_secs(config.task_timeout_secs);
        let result = tokio::time::timeout(timeout_duration, ctx.handle_upload(&task)).await;

        match result {
            Ok(Ok(_summary)) => {
                repository.mark_done(task.id).await?;
                tracing::info!(task_id = %task.id, "Upload task completed");
                Ok(())
            }
            Ok(Err(e)) => {
                let transient = is_transient_failure(&e);

                tracing::error!(
                    task_id = %task.id,
                    error = %e,
                    retry_count = task.retry_count,
                    max_attempts = task.max_attempts,
                    transient = transient,
                    "Upload task execution failed"
                );

                // Permanent failures skip the retry budget: retrying cannot help.
                if !transient {
                    let error_result = json!({
                        "error": e.to_string(),
                        "retry_count": task.retry_count,
                        "permanent": true,
                    });
                    repository.mark_failed(task.id, error_result).await?;
                    return Err(e);
                }

                if task.can_retry() {
                    let error_result = json!({
                        "error": e.to_string(),
                        "retry_count": task.retry_count,
                    });
                    repository
                        .schedule_retry(task.id, config.retry_delay_secs, error_result)
                        .await?;
                    Ok(())
                } else {
                    let error_result = json!({
                        "error": e.to_string(),
                        "retry_count": task.retry_count,
                        "reason": "Upload failed after maximum attempts",
                    });
                    repository.mark_failed(task.id, error_result).await?;
                    tracing::error!(task_id = %task.id, "Upload task failed after max attempts");
                    Err(e)
                }
            }
            Err(_) => {
                // Timed out: the remote call is treated as atomic, so expiry is
                // just another transient failure for the retry policy.
                let error_result = json!({
                    "error": "Upload task execution timed out",
                    "timeout_secs": config.task_timeout_secs,
                });
                tracing::error!(
                    task_id = %task.id,
                    timeout_secs = config.task_timeout_secs,
                    "Upload task execution timed out"
                );
                if task.can_retry() {
                    repository
                        .schedule_retry(task.id, config.retry_delay_secs, error_result)
                        .await?;
                    Ok(())
                } else {
                    repository.mark_failed(task.id, error_result).await?;
                    Err(anyhow::anyhow!("Upload task execution timed out"))
                }
            }
        }
    }

    /// Signals the worker pool to stop claiming new tasks and exit the main
    /// loop. Returns immediately; already-spawned handlers run to completion
    /// or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating upload queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for UploadQueue {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}
