//! Per-audience notification (level 1) models.
//!
//! The four audience tables share one shape, so a single row struct and
//! create DTO serve all of them; the table is picked from
//! [`Audience::table`](tavola_core::Audience::table) at query time.

use serde::Serialize;
use sqlx::FromRow;
use tavola_core::types::{DbId, Timestamp};

/// Lifecycle status of a notification row.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const DELIVERED: &str = "delivered";
    pub const FAILED: &str = "failed";
    pub const READ: &str = "read";
}

/// A row from one of the `*_notifications` tables.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub event_id: String,
    pub user_id: DbId,
    /// Restaurant or agency id the recipient belongs to, if any.
    pub org_id: Option<DbId>,
    /// Multi-location staff hub id, if any.
    pub hub_id: Option<DbId>,
    pub event_type: String,
    pub aggregate_type: String,
    pub title: String,
    pub body: String,
    pub properties: serde_json::Value,
    pub channel: String,
    pub status: String,
    pub priority: String,
    /// Broadcast flag: the first recipient to read reads for the group.
    pub read_by_all: bool,
    pub read_by_user_id: Option<DbId>,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// DTO for one fan-out row: a single (recipient, channel) pair.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub event_id: String,
    pub user_id: DbId,
    pub org_id: Option<DbId>,
    pub hub_id: Option<DbId>,
    pub event_type: String,
    pub aggregate_type: String,
    pub title: String,
    pub body: String,
    pub properties: serde_json::Value,
    pub channel: String,
    pub priority: String,
    pub read_by_all: bool,
}
