//! Event outbox writer and pollers (level 0).
//!
//! [`record_event`] appends a domain event on the caller's open
//! transaction, so the event commits or rolls back with the business
//! mutation. The [`EventOutboxPoller`] then moves committed rows onto the
//! broker: claim, then publish one envelope per target audience. The row
//! stays `pending` until every target audience's listener confirms its
//! fan-out; the last confirming listener flips it to `processed`, so a
//! dead or lagged listener only delays an event, never loses it. Fast and
//! slow cadences work disjoint creation windows, so a row is only ever
//! visible to one of them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgConnection;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tavola_core::types::DbId;
use tavola_db::models::event_outbox::{EventOutbox, NewEvent};
use tavola_db::repositories::EventOutboxRepo;
use tavola_db::DbPool;

use crate::broker::{Broker, Envelope};
use crate::config::NotifyConfig;
use crate::routing::target_audiences;

/// Append a domain event to the outbox on the caller's transaction.
///
/// Assigns a fresh UUIDv7 event id and returns it; the id is the
/// idempotency key for every downstream stage.
pub async fn record_event(
    conn: &mut PgConnection,
    event_type: &str,
    aggregate_type: &str,
    aggregate_id: DbId,
    payload: serde_json::Value,
) -> Result<String, sqlx::Error> {
    let event_id = Uuid::now_v7().to_string();
    EventOutboxRepo::append(
        conn,
        &NewEvent {
            event_id: event_id.clone(),
            event_type: event_type.to_string(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            payload,
        },
    )
    .await?;
    tracing::debug!(event_id = %event_id, event_type, "Event recorded to outbox");
    Ok(event_id)
}

/// Publishes committed outbox rows to the broker.
pub struct EventOutboxPoller {
    pool: DbPool,
    broker: Arc<Broker>,
    config: NotifyConfig,
    worker_id: String,
}

impl EventOutboxPoller {
    pub fn new(pool: DbPool, broker: Arc<Broker>, config: NotifyConfig) -> Self {
        let worker_id = format!("event-poller-{}", Uuid::new_v4());
        Self { pool, broker, config, worker_id }
    }

    /// Run the fast poll loop over fresh rows until cancelled.
    pub async fn run_fast(self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.fast_poller_delay_ms));
        tracing::info!(worker_id = %self.worker_id, "Event outbox fast poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event outbox fast poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_fresh_once().await {
                        tracing::error!(error = %e, "Event outbox fast poll failed");
                    }
                }
            }
        }
    }

    /// Run the slow poll loop over stuck rows until cancelled.
    ///
    /// The safety net for rows the fast poller's window has moved past:
    /// rows created before a crash, or rows whose claim expired.
    pub async fn run_slow(self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.slow_poller_delay_ms));
        tracing::info!(worker_id = %self.worker_id, "Event outbox slow poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event outbox slow poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_stuck_once().await {
                        tracing::error!(error = %e, "Event outbox slow poll failed");
                    }
                }
            }
        }
    }

    /// Claim and publish rows inside the freshness window. Returns the
    /// number of rows processed.
    pub async fn poll_fresh_once(&self) -> Result<usize, sqlx::Error> {
        let boundary = Utc::now() - chrono::Duration::seconds(self.config.fresh_window_secs);
        let rows = EventOutboxRepo::claim_fresh(
            &self.pool,
            &self.worker_id,
            boundary,
            self.config.claim_expiry_secs,
            self.config.channel_batch_size,
        )
        .await?;
        self.publish_claimed(rows).await
    }

    /// Claim and publish rows older than the staleness threshold.
    pub async fn poll_stuck_once(&self) -> Result<usize, sqlx::Error> {
        let boundary = Utc::now() - chrono::Duration::seconds(self.config.fresh_window_secs);
        let rows = EventOutboxRepo::claim_stuck(
            &self.pool,
            &self.worker_id,
            boundary,
            self.config.claim_expiry_secs,
            self.config.channel_batch_size,
        )
        .await?;
        self.publish_claimed(rows).await
    }

    async fn publish_claimed(&self, rows: Vec<EventOutbox>) -> Result<usize, sqlx::Error> {
        let count = rows.len();
        for row in rows {
            let mut unreached = Vec::new();
            for audience in target_audiences(&row.event_type) {
                let subscribers = self.broker.publish(Envelope {
                    routing_key: audience.routing_key(&row.event_type),
                    event_id: row.event_id.clone(),
                    event_type: row.event_type.clone(),
                    aggregate_type: row.aggregate_type.clone(),
                    aggregate_id: row.aggregate_id,
                    payload: row.payload.clone(),
                    published_at: Utc::now(),
                });
                if subscribers == 0 {
                    unreached.push(audience.as_str());
                }
            }
            if unreached.is_empty() {
                // The audience listeners confirm fan-out per consumer; the
                // last one flips the row to processed.
                tracing::debug!(event_id = %row.event_id, event_type = %row.event_type,
                    "Event published to every target audience");
            } else {
                // Leave the row pending so the slow poller re-publishes
                // once the missing listeners are back. Listeners that did
                // receive this envelope absorb the redelivery idempotently.
                EventOutboxRepo::mark_publish_failure(
                    &self.pool,
                    &row.event_id,
                    &format!("no live subscriber for {}", unreached.join(", ")),
                    self.config.max_publish_retries,
                )
                .await?;
                tracing::warn!(event_id = %row.event_id, audiences = ?unreached,
                    "No subscriber for event, will retry");
            }
        }
        Ok(count)
    }
}
