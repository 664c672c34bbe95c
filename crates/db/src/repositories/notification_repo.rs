//! Repository for the four per-audience notification tables (level 1).
//!
//! The audience tables are identical in shape, so every method takes an
//! [`Audience`] and formats its table name into the query. Status strings
//! live in [`crate::models::notification::status`].

use sqlx::PgPool;
use tavola_core::types::{DbId, Timestamp};
use tavola_core::Audience;

use crate::models::notification::{NewNotification, Notification};

/// Column list for `*_notifications` queries.
const COLUMNS: &str = "id, event_id, user_id, org_id, hub_id, event_type, aggregate_type, \
    title, body, properties, channel, status, priority, read_by_all, read_by_user_id, \
    read_at, created_at";

/// Provides fan-out inserts and status transitions for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert one fan-out row, suppressing duplicates.
    ///
    /// `ON CONFLICT DO NOTHING` against the `(event_id, user_id, channel)`
    /// unique key makes redelivered broker messages idempotent at the
    /// storage level. Returns the new id, or `None` when the row already
    /// existed.
    pub async fn insert(
        pool: &PgPool,
        audience: Audience,
        row: &NewNotification,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let query = format!(
            "INSERT INTO {table} \
                (event_id, user_id, org_id, hub_id, event_type, aggregate_type, \
                 title, body, properties, channel, priority, read_by_all) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (event_id, user_id, channel) DO NOTHING \
             RETURNING id",
            table = audience.table()
        );
        sqlx::query_scalar(&query)
            .bind(&row.event_id)
            .bind(row.user_id)
            .bind(row.org_id)
            .bind(row.hub_id)
            .bind(&row.event_type)
            .bind(&row.aggregate_type)
            .bind(&row.title)
            .bind(&row.body)
            .bind(&row.properties)
            .bind(&row.channel)
            .bind(&row.priority)
            .bind(row.read_by_all)
            .fetch_optional(pool)
            .await
    }

    /// Fetch a notification by id.
    pub async fn get(
        pool: &PgPool,
        audience: Audience,
        id: DbId,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM {table} WHERE id = $1",
            table = audience.table()
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List notifications for a recipient, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        audience: Audience,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let filter = if unread_only { "AND status != 'read'" } else { "" };
        let query = format!(
            "SELECT {COLUMNS} FROM {table} \
             WHERE user_id = $1 {filter} \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3",
            table = audience.table()
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Number of unread notifications for a recipient.
    pub async fn unread_count(
        pool: &PgPool,
        audience: Audience,
        user_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let query = format!(
            "SELECT COUNT(*) FROM {table} WHERE user_id = $1 AND status != 'read'",
            table = audience.table()
        );
        sqlx::query_scalar(&query).bind(user_id).fetch_one(pool).await
    }

    /// Transition a pending notification to `delivered` once its channel
    /// send succeeds. A row already read stays read.
    pub async fn mark_delivered(
        pool: &PgPool,
        audience: Audience,
        id: DbId,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "UPDATE {table} SET status = 'delivered' WHERE id = $1 AND status = 'pending'",
            table = audience.table()
        );
        sqlx::query(&query).bind(id).execute(pool).await?;
        Ok(())
    }

    /// Transition a pending notification to `failed` after its channel send
    /// exhausts the retry budget.
    pub async fn mark_failed(
        pool: &PgPool,
        audience: Audience,
        id: DbId,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "UPDATE {table} SET status = 'failed' WHERE id = $1 AND status = 'pending'",
            table = audience.table()
        );
        sqlx::query(&query).bind(id).execute(pool).await?;
        Ok(())
    }

    /// Mark a single, individually-addressed notification as read.
    ///
    /// Returns `true` if the row belonged to the user and was still
    /// readable. Failed rows are terminal and never transition to read.
    pub async fn mark_read_single(
        pool: &PgPool,
        audience: Audience,
        id: DbId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE {table} \
             SET status = 'read', read_at = NOW(), read_by_user_id = $2 \
             WHERE id = $1 AND user_id = $2 AND status IN ('pending', 'delivered')",
            table = audience.table()
        );
        let result = sqlx::query(&query).bind(id).bind(user_id).execute(pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Shared-read propagation: mark every sibling broadcast row as read in
    /// one statement.
    ///
    /// Siblings share the event id, the org scope and the channel. Only
    /// rows still in a readable state transition, which makes re-invocation
    /// a no-op, keeps the first actor's id on rows already read, and leaves
    /// terminally failed siblings untouched.
    pub async fn mark_read_shared(
        pool: &PgPool,
        audience: Audience,
        event_id: &str,
        org_id: Option<DbId>,
        channel: &str,
        reader_user_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let query = format!(
            "UPDATE {table} \
             SET status = 'read', read_at = NOW(), read_by_user_id = $4 \
             WHERE event_id = $1 \
               AND org_id IS NOT DISTINCT FROM $2 \
               AND channel = $3 \
               AND read_by_all = TRUE \
               AND status IN ('pending', 'delivered')",
            table = audience.table()
        );
        let result = sqlx::query(&query)
            .bind(event_id)
            .bind(org_id)
            .bind(channel)
            .bind(reader_user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark all of a recipient's readable notifications as read. Returns
    /// the number of rows updated; failed rows stay failed.
    pub async fn mark_all_read(
        pool: &PgPool,
        audience: Audience,
        user_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let query = format!(
            "UPDATE {table} \
             SET status = 'read', read_at = NOW(), read_by_user_id = $1 \
             WHERE user_id = $1 AND status IN ('pending', 'delivered')",
            table = audience.table()
        );
        let result = sqlx::query(&query).bind(user_id).execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Delete read or terminally failed rows older than the cutoff.
    pub async fn purge_terminal_before(
        pool: &PgPool,
        audience: Audience,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let query = format!(
            "DELETE FROM {table} \
             WHERE status IN ('read', 'failed') AND created_at < $1",
            table = audience.table()
        );
        let result = sqlx::query(&query).bind(cutoff).execute(pool).await?;
        Ok(result.rows_affected())
    }
}
