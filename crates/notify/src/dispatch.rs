//! Notification outbox poller and channel-dispatch listener (level 2).
//!
//! The poller mirrors the event-outbox claim/publish/mark protocol, scoped
//! to `notification_outbox`: each published envelope tells the dispatch
//! listener which notification is ready for channel delivery. The listener
//! creates the per-channel tracking row; creation is idempotent, so a
//! redelivered dispatch message is harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tavola_core::Audience;
use tavola_db::repositories::{ChannelSendRepo, NotificationOutboxRepo, NotificationRepo};
use tavola_db::DbPool;

use crate::broker::{Broker, Envelope, RecvError, DISPATCH_KEY};
use crate::config::NotifyConfig;

/// Publishes dispatch messages for freshly fanned-out notifications.
pub struct NotificationOutboxPoller {
    pool: DbPool,
    broker: Arc<Broker>,
    config: NotifyConfig,
    worker_id: String,
}

impl NotificationOutboxPoller {
    pub fn new(pool: DbPool, broker: Arc<Broker>, config: NotifyConfig) -> Self {
        let worker_id = format!("dispatch-poller-{}", Uuid::new_v4());
        Self { pool, broker, config, worker_id }
    }

    /// Run the poll loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.fast_poller_delay_ms));
        tracing::info!(worker_id = %self.worker_id, "Notification outbox poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification outbox poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Notification outbox poll failed");
                    }
                }
            }
        }
    }

    /// Claim pending rows and publish one dispatch envelope each. Returns
    /// the number of rows published.
    pub async fn poll_once(&self) -> Result<usize, sqlx::Error> {
        let rows = NotificationOutboxRepo::claim_pending(
            &self.pool,
            &self.worker_id,
            self.config.claim_expiry_secs,
            self.config.channel_batch_size,
        )
        .await?;
        let mut published = 0;
        for row in rows {
            let subscribers = self.broker.publish(Envelope {
                routing_key: DISPATCH_KEY.to_string(),
                event_id: format!("dispatch-{}", row.id),
                event_type: DISPATCH_KEY.to_string(),
                aggregate_type: row.aggregate_type.clone(),
                aggregate_id: row.aggregate_id,
                payload: serde_json::json!({
                    "notification_id": row.notification_id,
                    "audience": row.audience,
                }),
                published_at: Utc::now(),
            });
            if subscribers == 0 {
                NotificationOutboxRepo::mark_publish_failure(
                    &self.pool,
                    row.id,
                    "no live subscriber",
                    self.config.max_publish_retries,
                )
                .await?;
                tracing::warn!(outbox_id = row.id, "No dispatch subscriber, will retry");
                continue;
            }
            NotificationOutboxRepo::mark_published(&self.pool, row.id).await?;
            published += 1;
        }
        Ok(published)
    }
}

/// Creates channel tracking rows from dispatch messages.
pub struct DispatchListener {
    pool: DbPool,
}

impl DispatchListener {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run the listener loop until cancelled or the broker closes.
    pub async fn run(self, broker: Arc<Broker>, cancel: CancellationToken) {
        let mut subscription = broker.subscribe(DISPATCH_KEY);
        tracing::info!("Dispatch listener started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatch listener stopping");
                    break;
                }
                received = subscription.recv() => match received {
                    Ok(envelope) => {
                        if let Err(e) = self.handle(&envelope).await {
                            tracing::error!(error = %e, payload = %envelope.payload,
                                "Dispatch handling failed");
                        }
                    }
                    Err(RecvError::Lagged { skipped }) => {
                        tracing::warn!(skipped, "Dispatch listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Broker closed, dispatch listener shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Create the channel tracking row named by one dispatch message.
    pub async fn handle(&self, envelope: &Envelope) -> Result<(), sqlx::Error> {
        let notification_id = envelope.payload["notification_id"]
            .as_i64()
            .ok_or_else(|| sqlx::Error::Protocol("dispatch without notification_id".into()))?;
        let audience = envelope.payload["audience"]
            .as_str()
            .and_then(|s| Audience::parse(s).ok())
            .ok_or_else(|| sqlx::Error::Protocol("dispatch with unknown audience".into()))?;

        let Some(notification) =
            NotificationRepo::get(&self.pool, audience, notification_id).await?
        else {
            tracing::warn!(notification_id, audience = %audience,
                "Dispatch for a purged notification, skipped");
            return Ok(());
        };

        let created = ChannelSendRepo::ensure_exists(
            &self.pool,
            notification_id,
            audience,
            &notification.channel,
        )
        .await?;
        if created.is_some() {
            tracing::debug!(notification_id, audience = %audience,
                channel = %notification.channel, "Channel send created");
        }
        Ok(())
    }
}
