//! Work-queue guarantees against real Postgres: priority ordering, dedup,
//! lease visibility, retry/dead-letter accounting, and exactly-once
//! completion under concurrent workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leadgrid_common::WorkKind;
use leadgrid_store::testutil::postgres_container;
use leadgrid_store::{NewWorkItem, Queue};

fn no_backoff(pool: sqlx::PgPool) -> Queue {
    Queue::new(pool, Duration::ZERO, Duration::ZERO)
}

fn item(kind: WorkKind, key: &str) -> NewWorkItem {
    NewWorkItem::new(kind, serde_json::json!({ "key": key }), key)
}

#[tokio::test]
async fn lease_returns_highest_priority_due_item() {
    let (_pg, pool) = postgres_container().await;
    let queue = no_backoff(pool);

    queue
        .enqueue(item(WorkKind::ScrapeZone, "low").with_priority(3))
        .await
        .unwrap();
    queue
        .enqueue(item(WorkKind::ScrapeZone, "high").with_priority(9))
        .await
        .unwrap();
    queue
        .enqueue(item(WorkKind::ScrapeZone, "mid").with_priority(6))
        .await
        .unwrap();

    let first = queue
        .lease(&[WorkKind::ScrapeZone], Duration::from_secs(60), "w1")
        .await
        .unwrap()
        .expect("an item should be due");
    assert_eq!(first.dedup_key, "high");

    let second = queue
        .lease(&[WorkKind::ScrapeZone], Duration::from_secs(60), "w1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.dedup_key, "mid");
}

#[tokio::test]
async fn enqueue_is_idempotent_per_kind_and_dedup_key() {
    let (_pg, pool) = postgres_container().await;
    let queue = no_backoff(pool);

    let first = queue
        .enqueue(item(WorkKind::ValidateBusiness, "biz-1"))
        .await
        .unwrap();
    assert!(first.is_some());

    // Second enqueue while the first is unfinished: no-op.
    let second = queue
        .enqueue(item(WorkKind::ValidateBusiness, "biz-1"))
        .await
        .unwrap();
    assert!(second.is_none());
    assert_eq!(queue.pending_count().await.unwrap(), 1);

    // Same dedup key under a different kind is a different item.
    let other_kind = queue
        .enqueue(item(WorkKind::DiscoverWebsite, "biz-1"))
        .await
        .unwrap();
    assert!(other_kind.is_some());

    // Once completed, the key is free again.
    queue.complete(first.unwrap()).await.unwrap();
    let after_complete = queue
        .enqueue(item(WorkKind::ValidateBusiness, "biz-1"))
        .await
        .unwrap();
    assert!(after_complete.is_some());
}

#[tokio::test]
async fn leased_items_are_invisible_until_expiry() {
    let (_pg, pool) = postgres_container().await;
    let queue = no_backoff(pool);

    queue.enqueue(item(WorkKind::ScrapeZone, "z1")).await.unwrap();

    let leased = queue
        .lease(&[WorkKind::ScrapeZone], Duration::from_secs(60), "w1")
        .await
        .unwrap();
    assert!(leased.is_some());

    let second = queue
        .lease(&[WorkKind::ScrapeZone], Duration::from_secs(60), "w2")
        .await
        .unwrap();
    assert!(second.is_none(), "leased item must be invisible to other workers");
}

#[tokio::test]
async fn expired_leases_are_reaped_and_re_leased() {
    let (_pg, pool) = postgres_container().await;
    let queue = no_backoff(pool);

    queue.enqueue(item(WorkKind::ScrapeZone, "z1")).await.unwrap();

    queue
        .lease(&[WorkKind::ScrapeZone], Duration::ZERO, "crashed-worker")
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let reaped = queue.reap_expired().await.unwrap();
    assert_eq!(reaped, 1);

    let leased = queue
        .lease(&[WorkKind::ScrapeZone], Duration::from_secs(60), "w2")
        .await
        .unwrap();
    assert!(leased.is_some(), "reaped item should be leasable again");
}

#[tokio::test]
async fn scheduled_not_before_gates_leasing() {
    let (_pg, pool) = postgres_container().await;
    let queue = no_backoff(pool);

    let mut future_item = item(WorkKind::ScrapeZone, "later");
    future_item.not_before = Some(chrono::Utc::now() + chrono::Duration::hours(1));
    queue.enqueue(future_item).await.unwrap();

    let leased = queue
        .lease(&[WorkKind::ScrapeZone], Duration::from_secs(60), "w1")
        .await
        .unwrap();
    assert!(leased.is_none(), "future-scheduled item must not lease");
}

#[tokio::test]
async fn retry_boundary_moves_item_to_dead_letter_at_max_attempts() {
    let (_pg, pool) = postgres_container().await;
    let queue = no_backoff(pool);

    // validate_business defaults to max_attempts = 3
    queue
        .enqueue(item(WorkKind::ValidateBusiness, "biz-1"))
        .await
        .unwrap();

    for attempt in 1..=3 {
        let leased = queue
            .lease(&[WorkKind::ValidateBusiness], Duration::from_secs(60), "w1")
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("attempt {attempt} should lease"));

        let dead = queue
            .fail(leased.id, "render timeout", true)
            .await
            .unwrap();

        if attempt < 3 {
            assert!(!dead, "attempt {attempt} should reschedule");
        } else {
            assert!(dead, "attempt 3 of 3 must dead-letter");
        }
    }

    // Attempt max+1 never runs: nothing left to lease.
    assert_eq!(queue.pending_count().await.unwrap(), 0);
    assert_eq!(queue.dead_letter_count().await.unwrap(), 1);
    let leased = queue
        .lease(&[WorkKind::ValidateBusiness], Duration::from_secs(60), "w1")
        .await
        .unwrap();
    assert!(leased.is_none());
}

#[tokio::test]
async fn non_retryable_failure_dead_letters_immediately() {
    let (_pg, pool) = postgres_container().await;
    let queue = no_backoff(pool);

    queue
        .enqueue(item(WorkKind::ValidateBusiness, "biz-1"))
        .await
        .unwrap();
    let leased = queue
        .lease(&[WorkKind::ValidateBusiness], Duration::from_secs(60), "w1")
        .await
        .unwrap()
        .unwrap();

    let dead = queue.fail(leased.id, "auth failure", false).await.unwrap();
    assert!(dead);
    assert_eq!(queue.pending_count().await.unwrap(), 0);
    assert_eq!(queue.dead_letter_count().await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_workers_complete_each_item_exactly_once() {
    let (_pg, pool) = postgres_container().await;
    let queue = Arc::new(no_backoff(pool));

    const ITEMS: usize = 40;
    const WORKERS: usize = 8;

    for i in 0..ITEMS {
        queue
            .enqueue(item(WorkKind::ScrapeZone, &format!("zone-{i}")))
            .await
            .unwrap();
    }

    let completed = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for w in 0..WORKERS {
        let queue = queue.clone();
        let completed = completed.clone();
        handles.push(tokio::spawn(async move {
            let worker_id = format!("w{w}");
            loop {
                match queue
                    .lease(&[WorkKind::ScrapeZone], Duration::from_secs(60), &worker_id)
                    .await
                    .unwrap()
                {
                    Some(item) => {
                        queue.complete(item.id).await.unwrap();
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                    None => break,
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    // Exactly-once: completed + dead-lettered == enqueued.
    assert_eq!(completed.load(Ordering::SeqCst), ITEMS);
    assert_eq!(queue.pending_count().await.unwrap(), 0);
    assert_eq!(queue.dead_letter_count().await.unwrap(), 0);
}
