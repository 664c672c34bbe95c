//! Repository for the `notification_channel_sends` table (level 3).
//!
//! `sent` is the channel delivery tri-state: NULL = pending, TRUE =
//! delivered, FALSE = failed (terminal once the attempt budget is gone).
//! Each channel row is claimed, sent and updated independently, so one
//! channel's failure can never touch another channel of the same
//! notification.

use sqlx::PgPool;
use tavola_core::types::{DbId, Timestamp};
use tavola_core::Audience;

use crate::models::channel_send::{ChannelSend, ClaimedChannelSend};

/// Column list for `notification_channel_sends` queries.
const COLUMNS: &str = "id, notification_id, audience, channel_type, sent, attempt_count, \
    last_error, last_attempt_at, sent_at, claimed_by, claimed_at, created_at";

/// The four audience tables exposed as one relation for joins. Column
/// names mirror the audience tables; `audience` disambiguates ids.
const ALL_NOTIFICATIONS_CTE: &str = "all_notifications AS ( \
         SELECT id, 'ADMIN' AS audience, user_id, title, body, properties, priority, created_at \
           FROM admin_notifications \
         UNION ALL \
         SELECT id, 'RESTAURANT', user_id, title, body, properties, priority, created_at \
           FROM restaurant_notifications \
         UNION ALL \
         SELECT id, 'CUSTOMER', user_id, title, body, properties, priority, created_at \
           FROM customer_notifications \
         UNION ALL \
         SELECT id, 'AGENCY', user_id, title, body, properties, priority, created_at \
           FROM agency_notifications \
     )";

/// Provides per-channel delivery tracking operations.
pub struct ChannelSendRepo;

impl ChannelSendRepo {
    /// Create the tracking row for a (notification, channel) pair if it
    /// does not exist yet. Returns the new id, or `None` when the unique
    /// key already had a row (redelivered dispatch message).
    pub async fn ensure_exists(
        pool: &PgPool,
        notification_id: DbId,
        audience: Audience,
        channel_type: &str,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO notification_channel_sends (notification_id, audience, channel_type) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (notification_id, audience, channel_type) DO NOTHING \
             RETURNING id",
        )
        .bind(notification_id)
        .bind(audience.as_str())
        .bind(channel_type)
        .fetch_optional(pool)
        .await
    }

    /// Atomically claim up to `limit` pending sends for `worker_id`,
    /// joined with the notification each one delivers.
    ///
    /// Candidate selection prefers high-priority, older notifications, so
    /// when more work is pending than fits in a batch the important rows
    /// are claimed first. `created_after`/`created_before` carry the
    /// fast/slow poller freshness windows; pass `None` for an unwindowed
    /// claim.
    ///
    /// Postgres does not guarantee the `UPDATE … RETURNING` row order, so
    /// the returned batch carries `priority` and `created_at` for the
    /// caller to re-establish delivery order.
    pub async fn claim_pending(
        pool: &PgPool,
        worker_id: &str,
        created_after: Option<Timestamp>,
        created_before: Option<Timestamp>,
        claim_expiry_secs: i64,
        limit: i64,
    ) -> Result<Vec<ClaimedChannelSend>, sqlx::Error> {
        let query = format!(
            "WITH {ALL_NOTIFICATIONS_CTE}, \
             candidates AS ( \
                 SELECT cs.id FROM notification_channel_sends cs \
                 JOIN all_notifications n \
                   ON n.id = cs.notification_id AND n.audience = cs.audience \
                 WHERE cs.sent IS NULL \
                   AND (cs.claimed_at IS NULL OR cs.claimed_at < NOW() - make_interval(secs => $2)) \
                   AND ($3::timestamptz IS NULL OR cs.created_at >= $3) \
                   AND ($4::timestamptz IS NULL OR cs.created_at < $4) \
                 ORDER BY CASE n.priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END DESC, \
                          n.created_at \
                 LIMIT $5 \
                 FOR UPDATE OF cs SKIP LOCKED \
             ) \
             UPDATE notification_channel_sends cs \
             SET claimed_by = $1, claimed_at = NOW() \
             FROM candidates c, all_notifications n \
             WHERE cs.id = c.id \
               AND n.id = cs.notification_id AND n.audience = cs.audience \
             RETURNING cs.id, cs.notification_id, cs.audience, cs.channel_type, \
                       cs.attempt_count, cs.created_at, \
                       n.user_id, n.title, n.body, n.properties, n.priority"
        );
        sqlx::query_as::<_, ClaimedChannelSend>(&query)
            .bind(worker_id)
            .bind(claim_expiry_secs as f64)
            .bind(created_after)
            .bind(created_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark a send delivered.
    pub async fn mark_sent(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_channel_sends \
             SET sent = TRUE, sent_at = NOW(), attempt_count = attempt_count + 1, \
                 last_attempt_at = NOW(), claimed_by = NULL, claimed_at = NULL \
             WHERE id = $1 AND sent IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a transient send failure: `sent = FALSE` with the attempt
    /// counter bumped. The retry selector will re-queue the row while the
    /// attempt budget lasts; past the budget the FALSE state is terminal.
    pub async fn record_failure(
        pool: &PgPool,
        id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_channel_sends \
             SET sent = FALSE, attempt_count = attempt_count + 1, last_error = $2, \
                 last_attempt_at = NOW(), claimed_by = NULL, claimed_at = NULL \
             WHERE id = $1 AND sent IS NULL",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a permanent recipient-side failure (invalid address, blocked
    /// number): terminal immediately, without burning through the retry
    /// budget one attempt at a time.
    pub async fn record_permanent_failure(
        pool: &PgPool,
        id: DbId,
        error: &str,
        max_attempts: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_channel_sends \
             SET sent = FALSE, attempt_count = GREATEST(attempt_count + 1, $3), \
                 last_error = $2, last_attempt_at = NOW(), \
                 claimed_by = NULL, claimed_at = NULL \
             WHERE id = $1 AND sent IS NULL",
        )
        .bind(id)
        .bind(error)
        .bind(max_attempts)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Re-queue failed rows that still have attempt budget by resetting
    /// them to the pending state. Returns the number of rows re-queued.
    ///
    /// Websocket rows are never re-queued; delivery there is fire-and-forget.
    pub async fn requeue_retryable(
        pool: &PgPool,
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_channel_sends \
             SET sent = NULL \
             WHERE sent = FALSE \
               AND attempt_count < $1 \
               AND channel_type != 'WEBSOCKET'",
        )
        .bind(max_attempts)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// All channel rows for one notification.
    pub async fn list_for_notification(
        pool: &PgPool,
        notification_id: DbId,
        audience: Audience,
    ) -> Result<Vec<ChannelSend>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_channel_sends \
             WHERE notification_id = $1 AND audience = $2 \
             ORDER BY channel_type"
        );
        sqlx::query_as::<_, ChannelSend>(&query)
            .bind(notification_id)
            .bind(audience.as_str())
            .fetch_all(pool)
            .await
    }

    /// Whether every channel row of a notification has been delivered.
    pub async fn fully_delivered(
        pool: &PgPool,
        notification_id: DbId,
        audience: Audience,
    ) -> Result<bool, sqlx::Error> {
        let undelivered: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_channel_sends \
             WHERE notification_id = $1 AND audience = $2 \
               AND (sent IS NULL OR sent = FALSE)",
        )
        .bind(notification_id)
        .bind(audience.as_str())
        .fetch_one(pool)
        .await?;
        Ok(undelivered == 0)
    }

    /// Number of rows still awaiting a send attempt.
    pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notification_channel_sends WHERE sent IS NULL")
            .fetch_one(pool)
            .await
    }

    /// Number of terminally failed rows (attempt budget exhausted).
    pub async fn count_failed(pool: &PgPool, max_attempts: i32) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_channel_sends \
             WHERE sent = FALSE AND attempt_count >= $1",
        )
        .bind(max_attempts)
        .fetch_one(pool)
        .await
    }

    /// Delete rows in a terminal state (delivered, or failed past the
    /// attempt budget) older than the cutoff.
    pub async fn purge_terminal_before(
        pool: &PgPool,
        cutoff: Timestamp,
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM notification_channel_sends \
             WHERE (sent = TRUE AND sent_at < $1) \
                OR (sent = FALSE AND attempt_count >= $2 AND last_attempt_at < $1)",
        )
        .bind(cutoff)
        .bind(max_attempts)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
