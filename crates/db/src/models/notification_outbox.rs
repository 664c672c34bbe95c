//! Notification outbox (level 2) models.

use serde::Serialize;
use sqlx::FromRow;
use tavola_core::types::{DbId, Timestamp};

/// Publication status of a notification-outbox row.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const PUBLISHED: &str = "published";
    pub const FAILED: &str = "failed";
}

/// A row from the `notification_outbox` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationOutbox {
    pub id: DbId,
    pub notification_id: DbId,
    pub audience: String,
    pub aggregate_type: String,
    pub aggregate_id: DbId,
    pub status: String,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
}
