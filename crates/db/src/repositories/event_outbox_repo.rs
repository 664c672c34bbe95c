//! Repository for the `event_outbox` table (level 0).

use sqlx::{PgConnection, PgPool};
use tavola_core::types::{DbId, Timestamp};

use crate::models::event_outbox::{EventOutbox, NewEvent};

/// Column list for `event_outbox` queries.
const COLUMNS: &str = "id, event_id, event_type, aggregate_type, aggregate_id, payload, \
    status, processed_by, retry_count, error_message, claimed_by, claimed_at, \
    created_at, published_at, processed_at";

/// Provides outbox-pattern writes and poller operations for domain events.
pub struct EventOutboxRepo;

impl EventOutboxRepo {
    /// Append a domain event on the caller's open transaction.
    ///
    /// This is the outbox-pattern entry point: it must run on the same
    /// connection (and therefore transaction) as the business mutation, so
    /// the event commits or rolls back together with it.
    pub async fn append(conn: &mut PgConnection, event: &NewEvent) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO event_outbox \
                (event_id, event_type, aggregate_type, aggregate_id, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.payload)
        .fetch_one(conn)
        .await
    }

    /// Claim pending rows created at or after `created_after` (fresh rows,
    /// fast-poller predicate). See [`claim_pending`](Self::claim_pending).
    pub async fn claim_fresh(
        pool: &PgPool,
        worker_id: &str,
        created_after: Timestamp,
        claim_expiry_secs: i64,
        limit: i64,
    ) -> Result<Vec<EventOutbox>, sqlx::Error> {
        Self::claim_pending(pool, worker_id, Some(created_after), None, claim_expiry_secs, limit)
            .await
    }

    /// Claim pending rows created strictly before `created_before` (stuck
    /// rows, slow-poller predicate).
    pub async fn claim_stuck(
        pool: &PgPool,
        worker_id: &str,
        created_before: Timestamp,
        claim_expiry_secs: i64,
        limit: i64,
    ) -> Result<Vec<EventOutbox>, sqlx::Error> {
        Self::claim_pending(pool, worker_id, None, Some(created_before), claim_expiry_secs, limit)
            .await
    }

    /// Atomically claim up to `limit` pending rows for `worker_id`.
    ///
    /// A row is claimable when its status is `pending` and it is either
    /// unclaimed or its claim is older than `claim_expiry_secs` (a crashed
    /// worker's claim expires instead of wedging the row). The
    /// `FOR UPDATE SKIP LOCKED` sub-select makes concurrent pollers skip
    /// each other's claims instead of blocking.
    async fn claim_pending(
        pool: &PgPool,
        worker_id: &str,
        created_after: Option<Timestamp>,
        created_before: Option<Timestamp>,
        claim_expiry_secs: i64,
        limit: i64,
    ) -> Result<Vec<EventOutbox>, sqlx::Error> {
        let query = format!(
            "UPDATE event_outbox SET claimed_by = $1, claimed_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM event_outbox \
                 WHERE status = 'pending' \
                   AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $2)) \
                   AND ($3::timestamptz IS NULL OR created_at >= $3) \
                   AND ($4::timestamptz IS NULL OR created_at < $4) \
                 ORDER BY created_at \
                 LIMIT $5 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EventOutbox>(&query)
            .bind(worker_id)
            .bind(claim_expiry_secs as f64)
            .bind(created_after)
            .bind(created_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark a row processed once every target consumer has confirmed its
    /// fan-out.
    ///
    /// Guarded by `event_id` and the non-processed status so the transition
    /// happens exactly once even when the last two confirmations race.
    pub async fn mark_processed(
        pool: &PgPool,
        event_id: &str,
        consumer: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE event_outbox \
             SET status = 'processed', processed_by = $2, published_at = NOW(), \
                 processed_at = NOW(), claimed_by = NULL, claimed_at = NULL \
             WHERE event_id = $1 AND status != 'processed'",
        )
        .bind(event_id)
        .bind(consumer)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a publish failure: bump the retry counter, release the claim,
    /// and flip to `failed` once the retry budget is exhausted. Failed rows
    /// stay in the table for operator inspection.
    pub async fn mark_publish_failure(
        pool: &PgPool,
        event_id: &str,
        error: &str,
        max_retries: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE event_outbox \
             SET retry_count = retry_count + 1, \
                 error_message = $2, \
                 claimed_by = NULL, claimed_at = NULL, \
                 status = CASE WHEN retry_count + 1 >= $3 THEN 'failed' ELSE status END \
             WHERE event_id = $1 AND status = 'pending'",
        )
        .bind(event_id)
        .bind(error)
        .bind(max_retries)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record that one consumer has fanned this event out. Returns `false`
    /// when the confirmation was already recorded (redelivered envelope).
    pub async fn record_consumer(
        pool: &PgPool,
        event_id: &str,
        consumer: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO event_outbox_consumers (event_id, consumer) \
             VALUES ($1, $2) \
             ON CONFLICT (event_id, consumer) DO NOTHING",
        )
        .bind(event_id)
        .bind(consumer)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the given consumer has already fanned this event out.
    pub async fn is_processed_by(
        pool: &PgPool,
        event_id: &str,
        consumer: &str,
    ) -> Result<bool, sqlx::Error> {
        let exists: Option<bool> = sqlx::query_scalar(
            "SELECT TRUE FROM event_outbox_consumers WHERE event_id = $1 AND consumer = $2",
        )
        .bind(event_id)
        .bind(consumer)
        .fetch_optional(pool)
        .await?;
        Ok(exists.unwrap_or(false))
    }

    /// The consumers that have confirmed fan-out for this event.
    pub async fn list_consumers(
        pool: &PgPool,
        event_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT consumer FROM event_outbox_consumers WHERE event_id = $1 ORDER BY consumer",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    /// Fetch a row by its caller-assigned event id.
    pub async fn get_by_event_id(
        pool: &PgPool,
        event_id: &str,
    ) -> Result<Option<EventOutbox>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM event_outbox WHERE event_id = $1");
        sqlx::query_as::<_, EventOutbox>(&query)
            .bind(event_id)
            .fetch_optional(pool)
            .await
    }

    /// Number of rows still awaiting publication.
    pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox WHERE status = 'pending'")
            .fetch_one(pool)
            .await
    }

    /// List terminally failed rows, newest first, for operator inspection.
    pub async fn list_failed(pool: &PgPool, limit: i64) -> Result<Vec<EventOutbox>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM event_outbox \
             WHERE status = 'failed' \
             ORDER BY created_at DESC \
             LIMIT $1"
        );
        sqlx::query_as::<_, EventOutbox>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete processed rows older than the cutoff, along with their
    /// consumer confirmations. Returns total rows removed.
    pub async fn purge_processed_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let event_ids: Vec<String> = sqlx::query_scalar(
            "DELETE FROM event_outbox \
             WHERE status = 'processed' AND processed_at < $1 \
             RETURNING event_id",
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await?;
        if event_ids.is_empty() {
            return Ok(0);
        }
        let consumers =
            sqlx::query("DELETE FROM event_outbox_consumers WHERE event_id = ANY($1)")
                .bind(&event_ids)
                .execute(pool)
                .await?;
        Ok(event_ids.len() as u64 + consumers.rows_affected())
    }
}
