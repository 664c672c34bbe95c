//! Block/preference hierarchy models.
//!
//! Four override levels plus admin rules, evaluated Global → MandatoryRule
//! → Organization → Hub → User. All tables use the opt-out model: no row
//! means the channel is enabled.

use chrono::NaiveTime;
use serde::Serialize;
use sqlx::FromRow;
use tavola_core::types::{DbId, Timestamp};

/// Organization kinds a block can scope to.
pub mod org_type {
    pub const RESTAURANT: &str = "restaurant";
    pub const AGENCY: &str = "agency";
}

/// Hub kinds a block can scope to.
pub mod hub_type {
    pub const RESTAURANT_HUB: &str = "restaurant_hub";
    pub const AGENCY_HUB: &str = "agency_hub";
}

/// A row from `global_notification_blocks`: platform-wide suppression.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GlobalNotificationBlock {
    pub id: DbId,
    pub event_type_pattern: String,
    pub blocked_channels: serde_json::Value,
    pub active: bool,
    pub starts_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// A row from `organization_notification_blocks`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrganizationNotificationBlock {
    pub id: DbId,
    pub org_type: String,
    pub org_id: DbId,
    pub event_type_pattern: String,
    pub blocked_channels: serde_json::Value,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub active: bool,
    pub created_at: Timestamp,
}

/// A row from `hub_notification_blocks`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HubNotificationBlock {
    pub id: DbId,
    pub hub_type: String,
    pub hub_id: DbId,
    pub event_type_pattern: String,
    pub blocked_channels: serde_json::Value,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub active: bool,
    pub created_at: Timestamp,
}

/// A row from `user_notification_blocks`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserNotificationBlock {
    pub id: DbId,
    pub user_id: DbId,
    pub event_type_pattern: String,
    pub blocked_channels: serde_json::Value,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub active: bool,
    pub created_at: Timestamp,
}

/// A row from `event_type_notification_rules` (admin-defined).
///
/// Mandatory channels bypass org/hub/user blocks; `user_can_disable = false`
/// removes the user level from evaluation for matching event types.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventTypeNotificationRule {
    pub id: DbId,
    pub event_type_pattern: String,
    pub mandatory_channels: serde_json::Value,
    pub user_can_disable: bool,
    pub created_at: Timestamp,
}
