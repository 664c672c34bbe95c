//! Integration tests for the event-outbox claim protocol:
//! - appends are transactional with the caller
//! - concurrent claims never hand the same row to two workers
//! - claim expiry releases rows held by crashed workers
//! - consumer confirmations accumulate one per audience listener
//! - the processed transition happens exactly once

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tavola_db::models::event_outbox::{status, NewEvent};
use tavola_db::repositories::EventOutboxRepo;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_event(event_id: &str) -> NewEvent {
    NewEvent {
        event_id: event_id.to_string(),
        event_type: "RESERVATION_REQUESTED".to_string(),
        aggregate_type: "reservation".to_string(),
        aggregate_id: 42,
        payload: serde_json::json!({"reservation_id": 42, "party_size": 4}),
    }
}

async fn append(pool: &PgPool, event_id: &str) {
    let mut tx = pool.begin().await.unwrap();
    EventOutboxRepo::append(&mut tx, &new_event(event_id)).await.unwrap();
    tx.commit().await.unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_append_rolls_back_with_caller(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    EventOutboxRepo::append(&mut tx, &new_event("evt-rollback")).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(EventOutboxRepo::get_by_event_id(&pool, "evt-rollback")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_duplicate_event_id_rejected(pool: PgPool) {
    append(&pool, "evt-dup").await;

    let mut tx = pool.begin().await.unwrap();
    let err = EventOutboxRepo::append(&mut tx, &new_event("evt-dup")).await.unwrap_err();
    match err {
        sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
        other => panic!("expected unique violation, got {other}"),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_claim_is_exclusive_until_expiry(pool: PgPool) {
    append(&pool, "evt-claim").await;
    let fresh_after = Utc::now() - Duration::seconds(60);

    let first = EventOutboxRepo::claim_fresh(&pool, "worker-a", fresh_after, 300, 10)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].claimed_by.as_deref(), Some("worker-a"));

    // Within the claim window another worker must see nothing.
    let second = EventOutboxRepo::claim_fresh(&pool, "worker-b", fresh_after, 300, 10)
        .await
        .unwrap();
    assert!(second.is_empty());

    // With an expired claim window the row becomes claimable again.
    let reclaimed = EventOutboxRepo::claim_fresh(&pool, "worker-b", fresh_after, 0, 10)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].claimed_by.as_deref(), Some("worker-b"));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_fresh_and_stuck_windows_are_disjoint(pool: PgPool) {
    append(&pool, "evt-old").await;
    sqlx::query("UPDATE event_outbox SET created_at = NOW() - INTERVAL '10 minutes' \
                 WHERE event_id = 'evt-old'")
        .execute(&pool)
        .await
        .unwrap();
    append(&pool, "evt-new").await;

    let boundary = Utc::now() - Duration::seconds(60);

    let fresh = EventOutboxRepo::claim_fresh(&pool, "fast", boundary, 300, 10).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].event_id, "evt-new");

    let stuck = EventOutboxRepo::claim_stuck(&pool, "slow", boundary, 300, 10).await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].event_id, "evt-old");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_mark_processed_exactly_once(pool: PgPool) {
    append(&pool, "evt-proc").await;

    assert!(EventOutboxRepo::mark_processed(&pool, "evt-proc", "ADMIN_NOTIFICATION_LISTENER")
        .await
        .unwrap());
    // Second transition is a no-op.
    assert!(!EventOutboxRepo::mark_processed(&pool, "evt-proc", "ADMIN_NOTIFICATION_LISTENER")
        .await
        .unwrap());

    let row = EventOutboxRepo::get_by_event_id(&pool, "evt-proc").await.unwrap().unwrap();
    assert_eq!(row.status, status::PROCESSED);
    assert_eq!(row.processed_by.as_deref(), Some("ADMIN_NOTIFICATION_LISTENER"));
    assert!(row.processed_at.is_some());
    assert!(row.claimed_by.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_consumer_confirmations_accumulate_per_listener(pool: PgPool) {
    append(&pool, "evt-fan").await;

    assert!(EventOutboxRepo::record_consumer(&pool, "evt-fan", "RESTAURANT_NOTIFICATION_LISTENER")
        .await
        .unwrap());
    // A redelivered envelope records nothing new.
    assert!(!EventOutboxRepo::record_consumer(&pool, "evt-fan", "RESTAURANT_NOTIFICATION_LISTENER")
        .await
        .unwrap());

    assert!(EventOutboxRepo::is_processed_by(&pool, "evt-fan", "RESTAURANT_NOTIFICATION_LISTENER")
        .await
        .unwrap());
    // Another audience's listener still sees the event as unconsumed.
    assert!(!EventOutboxRepo::is_processed_by(&pool, "evt-fan", "ADMIN_NOTIFICATION_LISTENER")
        .await
        .unwrap());

    assert!(EventOutboxRepo::record_consumer(&pool, "evt-fan", "ADMIN_NOTIFICATION_LISTENER")
        .await
        .unwrap());
    let consumers = EventOutboxRepo::list_consumers(&pool, "evt-fan").await.unwrap();
    assert_eq!(
        consumers,
        vec!["ADMIN_NOTIFICATION_LISTENER", "RESTAURANT_NOTIFICATION_LISTENER"]
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_publish_failure_exhausts_retry_budget(pool: PgPool) {
    append(&pool, "evt-fail").await;

    for attempt in 1..=3 {
        EventOutboxRepo::mark_publish_failure(&pool, "evt-fail", "broker down", 3)
            .await
            .unwrap();
        let row = EventOutboxRepo::get_by_event_id(&pool, "evt-fail").await.unwrap().unwrap();
        assert_eq!(row.retry_count, attempt);
        if attempt < 3 {
            assert_eq!(row.status, status::PENDING);
        } else {
            assert_eq!(row.status, status::FAILED);
            assert_eq!(row.error_message.as_deref(), Some("broker down"));
        }
    }

    // Failed rows are out of every poller's reach but stay listable.
    let boundary = Utc::now() - Duration::seconds(60);
    assert!(EventOutboxRepo::claim_fresh(&pool, "w", boundary, 0, 10).await.unwrap().is_empty());
    assert!(EventOutboxRepo::claim_stuck(&pool, "w", Utc::now(), 0, 10).await.unwrap().is_empty());
    let failed = EventOutboxRepo::list_failed(&pool, 10).await.unwrap();
    assert_eq!(failed.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_purge_only_removes_processed_rows(pool: PgPool) {
    append(&pool, "evt-keep").await;
    append(&pool, "evt-drop").await;
    EventOutboxRepo::record_consumer(&pool, "evt-drop", "ADMIN_NOTIFICATION_LISTENER")
        .await
        .unwrap();
    EventOutboxRepo::mark_processed(&pool, "evt-drop", "ADMIN_NOTIFICATION_LISTENER")
        .await
        .unwrap();

    // The event row and its consumer confirmation go together.
    let removed = EventOutboxRepo::purge_processed_before(&pool, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(EventOutboxRepo::count_pending(&pool).await.unwrap(), 1);
    assert!(EventOutboxRepo::get_by_event_id(&pool, "evt-keep").await.unwrap().is_some());
    assert!(EventOutboxRepo::list_consumers(&pool, "evt-drop").await.unwrap().is_empty());
}
