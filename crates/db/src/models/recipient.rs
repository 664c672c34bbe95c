//! Recipient directory models.
//!
//! One shape serves all four audience directories; `org_id`/`hub_id` are
//! NULL for admins and customers.

use serde::Serialize;
use sqlx::FromRow;
use tavola_core::types::DbId;

/// A resolved notification recipient with delivery addresses and channel
/// preferences.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Recipient {
    pub id: DbId,
    pub org_id: Option<DbId>,
    pub hub_id: Option<DbId>,
    pub email: String,
    pub phone: Option<String>,
    pub device_token: Option<String>,
    pub preferred_channels: serde_json::Value,
}
