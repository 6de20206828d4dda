//! Configuration module
//!
//! Environment-driven configuration for the ingestion pipeline: database,
//! staging storage, remote media store credentials, upload limits, and the
//! task queue tuning knobs.

use std::env;

const UPLOAD_MAX_ATTEMPTS: i32 = 3;
const UPLOAD_RETRY_DELAY_SECS: u64 = 10;
const UPLOAD_QUEUE_MAX_WORKERS: usize = 4;
const UPLOAD_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const UPLOAD_TASK_TIMEOUT_SECS: u64 = 600;
const STALE_TASK_REAP_INTERVAL_SECS: u64 = 60;
const STALE_TASK_GRACE_PERIOD_SECS: i64 = 300;
const TASK_RETENTION_DAYS: i32 = 30;
const MAX_IMAGE_SIZE_MB: usize = 10;
const MAX_VIDEO_SIZE_MB: usize = 500;

/// Remote media store credentials, passed through to the HTTP client.
#[derive(Clone, Debug)]
pub struct RemoteStoreConfig {
    pub upload_url: Option<String>,
    pub private_key: Option<String>,
    /// Base URL used for transformation rewrites. When absent the transform
    /// helper degrades to returning the stored URL unchanged.
    pub url_endpoint: Option<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    /// Ingest via the task queue when true; inline on the caller when false.
    pub upload_async: bool,
    pub upload_max_attempts: i32,
    pub upload_retry_delay_secs: u64,
    pub queue_max_workers: usize,
    pub queue_poll_interval_ms: u64,
    pub upload_task_timeout_secs: u64,
    /// Interval in seconds between runs of the stale task reaper. 0 = disabled.
    pub stale_task_reap_interval_secs: u64,
    /// Grace period in seconds before an in-flight task is considered stale.
    pub stale_task_grace_period_secs: i64,
    /// Retention in days for finished tasks. 0 = disabled.
    pub task_retention_days: i32,
    pub staging_path: String,
    pub staging_base_url: String,
    pub remote_store: RemoteStoreConfig,
    pub max_image_size_bytes: usize,
    pub max_video_size_bytes: usize,
    pub image_allowed_extensions: Vec<String>,
    pub image_allowed_content_types: Vec<String>,
    pub video_allowed_extensions: Vec<String>,
    pub video_allowed_content_types: Vec<String>,
}

fn csv_env(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            upload_async: env::var("UPLOAD_ASYNC")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            upload_max_attempts: env::var("UPLOAD_MAX_ATTEMPTS")
                .unwrap_or_else(|_| UPLOAD_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(UPLOAD_MAX_ATTEMPTS),
            upload_retry_delay_secs: env::var("UPLOAD_RETRY_DELAY_SECS")
                .unwrap_or_else(|_| UPLOAD_RETRY_DELAY_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_RETRY_DELAY_SECS),
            queue_max_workers: env::var("UPLOAD_QUEUE_MAX_WORKERS")
                .unwrap_or_else(|_| UPLOAD_QUEUE_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(UPLOAD_QUEUE_MAX_WORKERS),
            queue_poll_interval_ms: env::var("UPLOAD_QUEUE_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| UPLOAD_QUEUE_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(UPLOAD_QUEUE_POLL_INTERVAL_MS),
            upload_task_timeout_secs: env::var("UPLOAD_TASK_TIMEOUT_SECS")
                .unwrap_or_else(|_| UPLOAD_TASK_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_TASK_TIMEOUT_SECS),
            stale_task_reap_interval_secs: env::var("STALE_TASK_REAP_INTERVAL_SECS")
                .unwrap_or_else(|_| STALE_TASK_REAP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(STALE_TASK_REAP_INTERVAL_SECS),
            stale_task_grace_period_secs: env::var("STALE_TASK_GRACE_PERIOD_SECS")
                .unwrap_or_else(|_| STALE_TASK_GRACE_PERIOD_SECS.to_string())
                .parse()
                .unwrap_or(STALE_TASK_GRACE_PERIOD_SECS),
            task_retention_days: env::var("TASK_RETENTION_DAYS")
                .unwrap_or_else(|_| TASK_RETENTION_DAYS.to_string())
                .parse()
                .unwrap_or(TASK_RETENTION_DAYS),
            staging_path: env::var("STAGING_PATH")
                .map_err(|_| anyhow::anyhow!("STAGING_PATH must be set"))?,
            staging_base_url: env::var("STAGING_BASE_URL")
                .map_err(|_| anyhow::anyhow!("STAGING_BASE_URL must be set"))?,
            remote_store: RemoteStoreConfig {
                upload_url: env::var("REMOTE_STORE_UPLOAD_URL").ok().filter(|s| !s.is_empty()),
                private_key: env::var("REMOTE_STORE_PRIVATE_KEY")
                    .ok()
                    .filter(|s| !s.is_empty()),
                url_endpoint: env::var("REMOTE_STORE_URL_ENDPOINT")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },
            max_image_size_bytes: env::var("MAX_IMAGE_SIZE_MB")
                .unwrap_or_else(|_| MAX_IMAGE_SIZE_MB.to_string())
                .parse::<usize>()
                .unwrap_or(MAX_IMAGE_SIZE_MB)
                * 1024
                * 1024,
            max_video_size_bytes: env::var("MAX_VIDEO_SIZE_MB")
                .unwrap_or_else(|_| MAX_VIDEO_SIZE_MB.to_string())
                .parse::<usize>()
                .unwrap_or(MAX_VIDEO_SIZE_MB)
                * 1024
                * 1024,
            image_allowed_extensions: csv_env("IMAGE_ALLOWED_EXTENSIONS", "jpg,jpeg,png,gif,webp"),
            image_allowed_content_types: csv_env(
                "IMAGE_ALLOWED_CONTENT_TYPES",
                "image/jpeg,image/png,image/gif,image/webp",
            ),
            video_allowed_extensions: csv_env("VIDEO_ALLOWED_EXTENSIONS", "mp4,mov,webm,mkv"),
            video_allowed_content_types: csv_env(
                "VIDEO_ALLOWED_CONTENT_TYPES",
                "video/mp4,video/quicktime,video/webm,video/x-matroska",
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.upload_max_attempts < 0 {
            return Err(anyhow::anyhow!("UPLOAD_MAX_ATTEMPTS must be non-negative"));
        }

        if self.queue_max_workers == 0 {
            return Err(anyhow::anyhow!("UPLOAD_QUEUE_MAX_WORKERS must be at least 1"));
        }

        // Uploading requires both the endpoint and the key; the URL-rewrite
        // endpoint alone is fine (transform-only deployments).
        if self.remote_store.upload_url.is_some() && self.remote_store.private_key.is_none() {
            return Err(anyhow::anyhow!(
                "REMOTE_STORE_PRIVATE_KEY must be set when REMOTE_STORE_UPLOAD_URL is configured"
            ));
        }

        Ok(())
    }
}
