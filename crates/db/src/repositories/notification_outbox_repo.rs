//! Repository for the `notification_outbox` table (level 2).

use sqlx::PgPool;
use tavola_core::types::{DbId, Timestamp};
use tavola_core::Audience;

use crate::models::notification_outbox::NotificationOutbox;

/// Column list for `notification_outbox` queries.
const COLUMNS: &str = "id, notification_id, audience, aggregate_type, aggregate_id, \
    status, retry_count, error_message, claimed_by, claimed_at, created_at, published_at";

/// Provides enqueue and poller operations for the notification outbox.
pub struct NotificationOutboxRepo;

impl NotificationOutboxRepo {
    /// Enqueue a freshly created notification for channel dispatch.
    ///
    /// Idempotent on `(notification_id, audience)` so a listener retry
    /// cannot enqueue the same notification twice.
    pub async fn enqueue(
        pool: &PgPool,
        notification_id: DbId,
        audience: Audience,
        aggregate_type: &str,
        aggregate_id: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO notification_outbox \
                (notification_id, audience, aggregate_type, aggregate_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (notification_id, audience) DO NOTHING \
             RETURNING id",
        )
        .bind(notification_id)
        .bind(audience.as_str())
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_optional(pool)
        .await
    }

    /// Atomically claim up to `limit` pending rows for `worker_id`, oldest
    /// first. Same claim-expiry and `SKIP LOCKED` rules as the event
    /// outbox.
    pub async fn claim_pending(
        pool: &PgPool,
        worker_id: &str,
        claim_expiry_secs: i64,
        limit: i64,
    ) -> Result<Vec<NotificationOutbox>, sqlx::Error> {
        let query = format!(
            "UPDATE notification_outbox SET claimed_by = $1, claimed_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM notification_outbox \
                 WHERE status = 'pending' \
                   AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $2)) \
                 ORDER BY created_at \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationOutbox>(&query)
            .bind(worker_id)
            .bind(claim_expiry_secs as f64)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark a row published after the dispatch message reached the broker.
    pub async fn mark_published(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_outbox \
             SET status = 'published', published_at = NOW(), \
                 claimed_by = NULL, claimed_at = NULL \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a publish failure and release the claim; flips to `failed`
    /// once the retry budget is exhausted.
    pub async fn mark_publish_failure(
        pool: &PgPool,
        id: DbId,
        error: &str,
        max_retries: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_outbox \
             SET retry_count = retry_count + 1, \
                 error_message = $2, \
                 claimed_by = NULL, claimed_at = NULL, \
                 status = CASE WHEN retry_count + 1 >= $3 THEN 'failed' ELSE status END \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(error)
        .bind(max_retries)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Number of rows still awaiting publication.
    pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox WHERE status = 'pending'")
            .fetch_one(pool)
            .await
    }

    /// Delete published rows older than the cutoff.
    pub async fn purge_published_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM notification_outbox WHERE status = 'published' AND published_at < $1",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
