//! Read-state propagation.
//!
//! Individually-addressed notifications are read one row at a time;
//! broadcast notifications (`read_by_all`) are read for the whole sibling
//! group in a single statement: every row sharing the originating event,
//! the org scope and the channel flips to `read`, stamped with the first
//! actor's id. Re-invocation is a no-op either way.

use tavola_core::types::DbId;
use tavola_core::Audience;
use tavola_db::repositories::NotificationRepo;
use tavola_db::DbPool;

/// Mark one notification read on behalf of a user.
///
/// Returns the number of rows transitioned: 0 if the notification is
/// unknown, already read, or (for individually-addressed rows) owned by
/// someone else; more than 1 when a shared read propagates to siblings.
pub async fn mark_read(
    pool: &DbPool,
    audience: Audience,
    notification_id: DbId,
    acting_user_id: DbId,
) -> Result<u64, sqlx::Error> {
    let Some(notification) = NotificationRepo::get(pool, audience, notification_id).await? else {
        return Ok(0);
    };

    if !notification.read_by_all {
        let updated =
            NotificationRepo::mark_read_single(pool, audience, notification_id, acting_user_id)
                .await?;
        return Ok(updated as u64);
    }

    let updated = NotificationRepo::mark_read_shared(
        pool,
        audience,
        &notification.event_id,
        notification.org_id,
        &notification.channel,
        acting_user_id,
    )
    .await?;
    if updated > 1 {
        tracing::debug!(audience = %audience, event_id = %notification.event_id,
            updated, "Shared read propagated to siblings");
    }
    Ok(updated)
}

/// Mark every unread notification of one user read. Returns the number of
/// rows transitioned.
pub async fn mark_all_read(
    pool: &DbPool,
    audience: Audience,
    user_id: DbId,
) -> Result<u64, sqlx::Error> {
    NotificationRepo::mark_all_read(pool, audience, user_id).await
}
