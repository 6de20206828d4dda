//! Vitrina operational CLI
//!
//! Commands:
//!   worker               run the upload queue worker pool
//!   migrate-legacy-media backfill legacy catalog attachments into media records
//!   queue-stats          print upload queue counts
//!   prune-tasks          delete old finished upload tasks

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use vitrina_core::{Config, RecordStore, UploadTaskSink};
use vitrina_db::{CatalogRepository, MediaRecordRepository, UploadTaskRepository};
use vitrina_ingest::{
    BackfillMigrator, IngestContext, IngestionOrchestrator, MediaService, ServiceOptions,
};
use vitrina_storage::{HttpRemoteStore, StagingStorage};
use vitrina_worker::{UploadHandlerContext, UploadQueue, UploadQueueConfig};

const DB_MAX_CONNECTIONS: u32 = 10;
const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();

    let command = std::env::args().nth(1).unwrap_or_default();
    if command.is_empty() {
        eprintln!("Usage: vitrina <worker|migrate-legacy-media|queue-stats|prune-tasks>");
        std::process::exit(2);
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = connect(&config).await?;

    match command.as_str() {
        "worker" => run_worker(&config, pool).await,
        "migrate-legacy-media" => migrate_legacy_media(&config, pool).await,
        "queue-stats" => queue_stats(&config, pool).await,
        "prune-tasks" => prune_tasks(&config, pool).await,
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: vitrina <worker|migrate-legacy-media|queue-stats|prune-tasks>");
            std::process::exit(2);
        }
    }
}

async fn connect(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(DB_CONNECT_TIMEOUT_SECS))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("../vitrina-db/migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

/// Construct the shared pipeline context from configuration.
async fn build_context(config: &Config, pool: &PgPool) -> Result<IngestContext> {
    let staging = StagingStorage::new(&config.staging_path, config.staging_base_url.clone())
        .await
        .context("Failed to initialize staging storage")?;

    let remote = HttpRemoteStore::from_config(&config.remote_store)
        .context("Failed to initialize remote media store client")?;

    let records: Arc<dyn RecordStore> = Arc::new(MediaRecordRepository::new(pool.clone()));

    Ok(IngestContext {
        records,
        staging: Arc::new(staging),
        remote: Arc::new(remote),
    })
}

fn queue_config(config: &Config) -> UploadQueueConfig {
    UploadQueueConfig {
        max_workers: config.queue_max_workers,
        poll_interval_ms: config.queue_poll_interval_ms,
        task_timeout_secs: config.upload_task_timeout_secs,
        retry_delay_secs: config.upload_retry_delay_secs,
        stale_task_reap_interval_secs: config.stale_task_reap_interval_secs,
        stale_task_grace_period_secs: config.stale_task_grace_period_secs,
    }
}

async fn run_worker(config: &Config, pool: PgPool) -> Result<()> {
    let ctx = build_context(config, &pool).await?;
    let task_repo = UploadTaskRepository::new(pool.clone(), config.upload_max_attempts);

    let service = Arc::new(MediaService::new(
        ctx,
        Arc::new(task_repo.clone()),
        ServiceOptions::from(config),
    ));

    // The queue holds the context weakly; keep the strong handle alive here.
    let context: Arc<dyn UploadHandlerContext> = service;
    let queue = UploadQueue::new(
        task_repo,
        queue_config(config),
        Arc::downgrade(&context),
        Some(pool),
    );

    tracing::info!("Upload worker running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    queue.shutdown().await;
    Ok(())
}

async fn migrate_legacy_media(config: &Config, pool: PgPool) -> Result<()> {
    let ctx = build_context(config, &pool).await?;
    let records = ctx.records.clone();

    let sink: Arc<dyn UploadTaskSink> = Arc::new(UploadTaskRepository::new(
        pool.clone(),
        config.upload_max_attempts,
    ));
    let orchestrator = Arc::new(IngestionOrchestrator::new(
        ctx,
        sink,
        config.upload_async,
    ));

    let catalog = Arc::new(CatalogRepository::new(pool));
    let migrator = BackfillMigrator::new(catalog, records, orchestrator);

    let summary = migrator.run().await?;

    println!(
        "Migrated {} images and {} videos.",
        summary.images_migrated, summary.videos_migrated
    );
    if !summary.failures.is_empty() {
        println!("{} failures:", summary.failures.len());
        for failure in &summary.failures {
            println!("  {}", failure);
        }
    }

    Ok(())
}

async fn queue_stats(config: &Config, pool: PgPool) -> Result<()> {
    let repo = UploadTaskRepository::new(pool, config.upload_max_attempts);
    let stats = repo.get_stats().await?;

    println!("queued:    {}", stats.queued);
    println!("in_flight: {}", stats.in_flight);
    println!("retrying:  {}", stats.retrying);
    println!("done:      {}", stats.done);
    println!("failed:    {}", stats.failed);
    println!("depth:     {}", stats.depth());

    Ok(())
}

async fn prune_tasks(config: &Config, pool: PgPool) -> Result<()> {
    if config.task_retention_days <= 0 {
        println!("Task retention disabled (TASK_RETENTION_DAYS=0), nothing to do.");
        return Ok(());
    }

    let repo = UploadTaskRepository::new(pool, config.upload_max_attempts);
    let deleted = repo
        .delete_old_finished_tasks(config.task_retention_days)
        .await?;

    println!(
        "Deleted {} finished tasks older than {} days.",
        deleted, config.task_retention_days
    );

    Ok(())
}
