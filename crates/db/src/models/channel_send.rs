//! Channel delivery tracking (level 3) models.

use serde::Serialize;
use sqlx::FromRow;
use tavola_core::types::{DbId, Timestamp};

/// A row from the `notification_channel_sends` table.
///
/// `sent` is tri-state: `None` = pending, `Some(true)` = delivered,
/// `Some(false)` = terminal failure after the retry budget ran out.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChannelSend {
    pub id: DbId,
    pub notification_id: DbId,
    pub audience: String,
    pub channel_type: String,
    pub sent: Option<bool>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// A pending channel send joined with the notification it delivers, as
/// claimed by the channel poller. Carries everything a sender needs.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedChannelSend {
    pub id: DbId,
    pub notification_id: DbId,
    pub audience: String,
    pub channel_type: String,
    pub attempt_count: i32,
    pub created_at: Timestamp,
    pub user_id: DbId,
    pub title: String,
    pub body: String,
    pub properties: serde_json::Value,
    pub priority: String,
}
