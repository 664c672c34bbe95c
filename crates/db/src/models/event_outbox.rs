//! Event outbox (level 0) models.

use serde::Serialize;
use sqlx::FromRow;
use tavola_core::types::{DbId, Timestamp};

/// Publication status of an event-outbox row.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const PROCESSED: &str = "processed";
    pub const FAILED: &str = "failed";
}

/// A row from the `event_outbox` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventOutbox {
    pub id: DbId,
    /// Globally unique, caller-assigned event id. The idempotency key for
    /// every downstream stage.
    pub event_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: DbId,
    pub payload: serde_json::Value,
    pub status: String,
    /// Name of the last consumer that processed this row, if any.
    pub processed_by: Option<String>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    /// Worker that currently holds the publish claim, if any.
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
    pub processed_at: Option<Timestamp>,
}

/// DTO for appending a domain event inside a business transaction.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: DbId,
    pub payload: serde_json::Value,
}
