//! Channel pollers and the retry selector (level 3).
//!
//! The poller claims pending channel-send rows, highest priority first,
//! resolves the recipient's delivery address and invokes the matching
//! sender. Every outcome lands back on the row: success flips `sent` to
//! TRUE, a transient failure records the attempt and a permanent failure
//! is terminal immediately. Channels never touch each other's rows, so a
//! dead SMS gateway cannot stall email delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tavola_core::{Audience, ChannelType, Priority};
use tavola_db::models::channel_send::ClaimedChannelSend;
use tavola_db::repositories::{ChannelSendRepo, NotificationRepo, RecipientRepo};
use tavola_db::DbPool;

use crate::broker::Broker;
use crate::config::NotifyConfig;
use crate::senders::{RecipientAddress, SendError, SenderRegistry};

/// Claims and delivers pending channel sends.
pub struct ChannelPoller {
    pool: DbPool,
    broker: Arc<Broker>,
    senders: Arc<SenderRegistry>,
    config: NotifyConfig,
    worker_id: String,
}

impl ChannelPoller {
    pub fn new(
        pool: DbPool,
        broker: Arc<Broker>,
        senders: Arc<SenderRegistry>,
        config: NotifyConfig,
    ) -> Self {
        let worker_id = format!("channel-poller-{}", Uuid::new_v4());
        Self { pool, broker, senders, config, worker_id }
    }

    /// Run the fast poll loop over fresh rows until cancelled.
    pub async fn run_fast(self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.fast_poller_delay_ms));
        tracing::info!(worker_id = %self.worker_id, "Channel fast poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Channel fast poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_fresh_once().await {
                        tracing::error!(error = %e, "Channel fast poll failed");
                    }
                }
            }
        }
    }

    /// Run the slow poll loop over stuck rows until cancelled.
    pub async fn run_slow(self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.slow_poller_delay_ms));
        tracing::info!(worker_id = %self.worker_id, "Channel slow poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Channel slow poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_stuck_once().await {
                        tracing::error!(error = %e, "Channel slow poll failed");
                    }
                }
            }
        }
    }

    /// Claim and deliver rows inside the freshness window.
    pub async fn poll_fresh_once(&self) -> Result<usize, sqlx::Error> {
        let boundary = Utc::now() - chrono::Duration::seconds(self.config.fresh_window_secs);
        self.poll_window(Some(boundary), None).await
    }

    /// Claim and deliver rows older than the staleness threshold.
    pub async fn poll_stuck_once(&self) -> Result<usize, sqlx::Error> {
        let boundary = Utc::now() - chrono::Duration::seconds(self.config.fresh_window_secs);
        self.poll_window(None, Some(boundary)).await
    }

    async fn poll_window(
        &self,
        created_after: Option<chrono::DateTime<Utc>>,
        created_before: Option<chrono::DateTime<Utc>>,
    ) -> Result<usize, sqlx::Error> {
        let mut batch = ChannelSendRepo::claim_pending(
            &self.pool,
            &self.worker_id,
            created_after,
            created_before,
            self.config.claim_expiry_secs,
            self.config.channel_batch_size,
        )
        .await?;
        // The claim query picks the most urgent rows but returns them in
        // arbitrary order; re-establish delivery order within the batch.
        sort_for_delivery(&mut batch);

        let count = batch.len();
        for send in batch {
            if let Err(e) = self.deliver(&send).await {
                tracing::error!(send_id = send.id, error = %e, "Channel delivery bookkeeping failed");
            }
        }
        Ok(count)
    }

    /// Deliver one claimed send and record the outcome.
    pub async fn deliver(&self, send: &ClaimedChannelSend) -> Result<(), sqlx::Error> {
        let audience = match Audience::parse(&send.audience) {
            Ok(audience) => audience,
            Err(e) => {
                return self.fail_permanently(send, None, &e.to_string()).await;
            }
        };
        let channel = match ChannelType::parse(&send.channel_type) {
            Ok(channel) => channel,
            Err(e) => {
                return self.fail_permanently(send, Some(audience), &e.to_string()).await;
            }
        };
        let Some(sender) = self.senders.get(channel) else {
            return self
                .fail_permanently(send, Some(audience), "channel not configured")
                .await;
        };
        let Some(recipient) = RecipientRepo::get(&self.pool, audience, send.user_id).await? else {
            return self
                .fail_permanently(send, Some(audience), "recipient not found or inactive")
                .await;
        };

        let to = RecipientAddress {
            audience,
            user_id: recipient.id,
            email: recipient.email,
            phone: recipient.phone,
            device_token: recipient.device_token,
        };
        let outcome = sender.send(&to, &send.title, &send.body, &send.properties).await;

        if channel.is_best_effort() {
            // Fire-and-forget: dispatched means sent, whatever happened.
            ChannelSendRepo::mark_sent(&self.pool, send.id).await?;
            NotificationRepo::mark_delivered(&self.pool, audience, send.notification_id).await?;
            return Ok(());
        }

        match outcome {
            Ok(()) => {
                ChannelSendRepo::mark_sent(&self.pool, send.id).await?;
                NotificationRepo::mark_delivered(&self.pool, audience, send.notification_id)
                    .await?;
                tracing::info!(send_id = send.id, channel = %channel, "Channel send delivered");
            }
            Err(SendError::Permanent(reason)) => {
                self.fail_permanently(send, Some(audience), &reason).await?;
            }
            Err(SendError::Transient(reason)) => {
                ChannelSendRepo::record_failure(&self.pool, send.id, &reason).await?;
                let attempts = send.attempt_count + 1;
                if attempts >= self.config.max_send_attempts {
                    self.mark_terminal(send, Some(audience), &reason).await?;
                } else {
                    tracing::warn!(send_id = send.id, channel = %channel, attempts,
                        error = %reason, "Channel send failed, will retry");
                }
            }
        }
        Ok(())
    }

    async fn fail_permanently(
        &self,
        send: &ClaimedChannelSend,
        audience: Option<Audience>,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        ChannelSendRepo::record_permanent_failure(
            &self.pool,
            send.id,
            reason,
            self.config.max_send_attempts,
        )
        .await?;
        self.mark_terminal(send, audience, reason).await
    }

    async fn mark_terminal(
        &self,
        send: &ClaimedChannelSend,
        audience: Option<Audience>,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        if let Some(audience) = audience {
            NotificationRepo::mark_failed(&self.pool, audience, send.notification_id).await?;
        }
        self.broker.publish(
            crate::broker::Envelope {
                routing_key: String::new(),
                event_id: format!("send-{}", send.id),
                event_type: send.channel_type.clone(),
                aggregate_type: "notification_channel_send".to_string(),
                aggregate_id: send.notification_id,
                payload: serde_json::json!({
                    "send_id": send.id,
                    "audience": send.audience,
                    "channel_type": send.channel_type,
                }),
                published_at: Utc::now(),
            }
            .into_dead_letter(reason),
        );
        tracing::error!(send_id = send.id, channel = %send.channel_type, error = %reason,
            "Channel send terminally failed");
        Ok(())
    }
}

/// Order a claimed batch for delivery: highest priority first, oldest
/// first within the same priority.
fn sort_for_delivery(batch: &mut [ClaimedChannelSend]) {
    batch.sort_by_key(|send| {
        (
            std::cmp::Reverse(Priority::parse_or_normal(&send.priority).rank()),
            send.created_at,
        )
    });
}

/// Run the retry selector: periodically put failed-but-retryable rows back
/// into the pending state so the pollers pick them up again.
pub async fn run_retry_selector(pool: DbPool, config: NotifyConfig, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_millis(config.slow_poller_delay_ms));
    tracing::info!("Channel retry selector started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Channel retry selector stopping");
                break;
            }
            _ = interval.tick() => {
                match ChannelSendRepo::requeue_retryable(&pool, config.max_send_attempts).await {
                    Ok(requeued) if requeued > 0 => {
                        tracing::info!(requeued, "Channel sends re-queued for retry");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Retry selector failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claimed(id: i64, priority: &str, age_secs: i64) -> ClaimedChannelSend {
        ClaimedChannelSend {
            id,
            notification_id: id,
            audience: "RESTAURANT".to_string(),
            channel_type: "EMAIL".to_string(),
            attempt_count: 0,
            created_at: Utc::now() - chrono::Duration::seconds(age_secs),
            user_id: 1,
            title: "t".to_string(),
            body: "b".to_string(),
            properties: serde_json::json!({}),
            priority: priority.to_string(),
        }
    }

    #[test]
    fn batch_orders_by_priority_then_creation() {
        let mut batch = vec![
            claimed(1, "normal", 10),
            claimed(2, "high", 5),
            claimed(3, "normal", 30),
            claimed(4, "low", 60),
        ];
        sort_for_delivery(&mut batch);
        let ids: Vec<i64> = batch.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);
    }

    #[test]
    fn equal_priority_delivers_oldest_first() {
        let mut batch = vec![claimed(1, "normal", 1), claimed(2, "normal", 120)];
        sort_for_delivery(&mut batch);
        assert_eq!(batch[0].id, 2);
    }
}
