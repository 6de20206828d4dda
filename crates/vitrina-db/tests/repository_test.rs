//! Repository integration tests. These need a live PostgreSQL database and
//! are ignored by default; run them with:
//!
//!   DATABASE_URL=postgresql://localhost/vitrina_test \
//!       cargo test -p vitrina-db -- --ignored

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use vitrina_core::models::{MediaKind, MediaRecord, TaskStatus};
use vitrina_db::{MediaRecordRepository, UploadTaskRepository};

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for db tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}

fn staged_record(owner_id: Uuid) -> MediaRecord {
    MediaRecord::new_local(
        owner_id,
        MediaKind::Image,
        "photo.jpg".to_string(),
        format!("staging/{}/photo.jpg", owner_id),
        0,
        false,
    )
}

#[tokio::test]
#[ignore]
async fn commit_remote_is_first_writer_wins() {
    let pool = test_pool().await;
    let repo = MediaRecordRepository::new(pool);

    let record = staged_record(Uuid::new_v4());
    repo.insert(&record).await.unwrap();

    let first = repo
        .commit_remote(record.id, "https://cdn/first", "f1")
        .await
        .unwrap();
    assert!(first);

    let second = repo
        .commit_remote(record.id, "https://cdn/second", "f2")
        .await
        .unwrap();
    assert!(!second);

    let stored = repo.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored.remote_url.as_deref(), Some("https://cdn/first"));
    assert_eq!(stored.remote_id.as_deref(), Some("f1"));
}

#[tokio::test]
#[ignore]
async fn list_orders_by_sort_order_then_recency() {
    let pool = test_pool().await;
    let repo = MediaRecordRepository::new(pool);
    let owner_id = Uuid::new_v4();

    let mut low = staged_record(owner_id);
    low.sort_order = 0;
    let mut high_old = staged_record(owner_id);
    high_old.sort_order = 1;
    high_old.created_at = chrono::Utc::now() - chrono::Duration::minutes(10);
    let mut high_new = staged_record(owner_id);
    high_new.sort_order = 1;

    repo.insert(&low).await.unwrap();
    repo.insert(&high_old).await.unwrap();
    repo.insert(&high_new).await.unwrap();

    let listed = repo.list_for_owner(owner_id, MediaKind::Image).await.unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![low.id, high_new.id, high_old.id]);
}

#[tokio::test]
#[ignore]
async fn delete_returns_the_removed_record() {
    let pool = test_pool().await;
    let repo = MediaRecordRepository::new(pool);

    let record = staged_record(Uuid::new_v4());
    repo.insert(&record).await.unwrap();

    let deleted = repo.delete(record.id).await.unwrap().unwrap();
    assert_eq!(deleted.id, record.id);
    assert!(deleted.local_ref.is_some());

    assert!(repo.get(record.id).await.unwrap().is_none());
    assert!(repo.delete(record.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn task_lifecycle_claim_retry_fail() {
    let pool = test_pool().await;
    let records = MediaRecordRepository::new(pool.clone());
    let tasks = UploadTaskRepository::new(pool, 3);

    let record = staged_record(Uuid::new_v4());
    records.insert(&record).await.unwrap();

    let task = tasks
        .create_task(MediaKind::Image, record.id, 3)
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Queued);

    let claimed = tasks.claim_next_task().await.unwrap().unwrap();
    assert_eq!(claimed.id, task.id);
    assert_eq!(claimed.status, TaskStatus::InFlight);
    assert!(claimed.started_at.is_some());

    // Retry pushes scheduled_at into the future, so the task is not
    // immediately claimable again.
    let retried = tasks
        .schedule_retry(task.id, 10, serde_json::json!({"error": "transient"}))
        .await
        .unwrap();
    assert_eq!(retried.status, TaskStatus::Retrying);
    assert_eq!(retried.retry_count, 1);

    let next = tasks.claim_next_task().await.unwrap();
    assert!(next.is_none(), "retrying task must wait out its delay");

    let failed = tasks
        .mark_failed(task.id, serde_json::json!({"error": "exhausted"}))
        .await
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.completed_at.is_some());

    let stats = tasks.get_stats().await.unwrap();
    assert!(stats.failed >= 1);
}

#[tokio::test]
#[ignore]
async fn stale_in_flight_tasks_are_requeued() {
    let pool = test_pool().await;
    let records = MediaRecordRepository::new(pool.clone());
    let tasks = UploadTaskRepository::new(pool, 3);

    let record = staged_record(Uuid::new_v4());
    records.insert(&record).await.unwrap();

    let task = tasks
        .create_task(MediaKind::Image, record.id, 3)
        .await
        .unwrap();
    let claimed = tasks.claim_next_task().await.unwrap().unwrap();
    assert_eq!(claimed.id, task.id);

    // Nothing is stale yet.
    let reaped = tasks.reap_stale_in_flight(3600).await.unwrap();
    assert_eq!(reaped, 0);

    // With a zero threshold the just-claimed task counts as stale.
    let reaped = tasks.reap_stale_in_flight(0).await.unwrap();
    assert!(reaped >= 1);

    let reclaimed = tasks.claim_next_task().await.unwrap().unwrap();
    assert_eq!(reclaimed.id, task.id);
}
