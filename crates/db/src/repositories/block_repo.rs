//! Repository for the block/preference hierarchy tables.
//!
//! Fetches active block rows per level; pattern matching and the actual
//! hierarchy evaluation are pure logic and live outside the db crate.

use sqlx::PgPool;
use tavola_core::types::DbId;

use crate::models::block::{
    EventTypeNotificationRule, GlobalNotificationBlock, HubNotificationBlock,
    OrganizationNotificationBlock, UserNotificationBlock,
};

/// Provides read access to the block hierarchy for channel resolution.
pub struct BlockRepo;

impl BlockRepo {
    /// Active global blocks, window-checked against the current time.
    pub async fn active_global_blocks(
        pool: &PgPool,
    ) -> Result<Vec<GlobalNotificationBlock>, sqlx::Error> {
        sqlx::query_as::<_, GlobalNotificationBlock>(
            "SELECT id, event_type_pattern, blocked_channels, active, \
                    starts_at, ends_at, created_at \
             FROM global_notification_blocks \
             WHERE active \
               AND (starts_at IS NULL OR starts_at <= NOW()) \
               AND (ends_at IS NULL OR ends_at > NOW())",
        )
        .fetch_all(pool)
        .await
    }

    /// Active admin rules. Evaluated against every event type in app code;
    /// the table is small and read-mostly.
    pub async fn active_rules(
        pool: &PgPool,
    ) -> Result<Vec<EventTypeNotificationRule>, sqlx::Error> {
        sqlx::query_as::<_, EventTypeNotificationRule>(
            "SELECT id, event_type_pattern, mandatory_channels, user_can_disable, created_at \
             FROM event_type_notification_rules",
        )
        .fetch_all(pool)
        .await
    }

    /// Active blocks for one organization.
    pub async fn active_org_blocks(
        pool: &PgPool,
        org_type: &str,
        org_id: DbId,
    ) -> Result<Vec<OrganizationNotificationBlock>, sqlx::Error> {
        sqlx::query_as::<_, OrganizationNotificationBlock>(
            "SELECT id, org_type, org_id, event_type_pattern, blocked_channels, \
                    quiet_hours_start, quiet_hours_end, active, created_at \
             FROM organization_notification_blocks \
             WHERE active AND org_type = $1 AND org_id = $2",
        )
        .bind(org_type)
        .bind(org_id)
        .fetch_all(pool)
        .await
    }

    /// Active blocks for one hub.
    pub async fn active_hub_blocks(
        pool: &PgPool,
        hub_type: &str,
        hub_id: DbId,
    ) -> Result<Vec<HubNotificationBlock>, sqlx::Error> {
        sqlx::query_as::<_, HubNotificationBlock>(
            "SELECT id, hub_type, hub_id, event_type_pattern, blocked_channels, \
                    quiet_hours_start, quiet_hours_end, active, created_at \
             FROM hub_notification_blocks \
             WHERE active AND hub_type = $1 AND hub_id = $2",
        )
        .bind(hub_type)
        .bind(hub_id)
        .fetch_all(pool)
        .await
    }

    /// Active blocks for one user.
    pub async fn active_user_blocks(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<UserNotificationBlock>, sqlx::Error> {
        sqlx::query_as::<_, UserNotificationBlock>(
            "SELECT id, user_id, event_type_pattern, blocked_channels, \
                    quiet_hours_start, quiet_hours_end, active, created_at \
             FROM user_notification_blocks \
             WHERE active AND user_id = $1",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
