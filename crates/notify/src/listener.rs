//! Audience listeners (level 1).
//!
//! One listener per audience subscribes to `notification.<audience>.*` and
//! fans each event out into notification rows: resolve the recipient set,
//! resolve allowed channels per recipient through the block hierarchy,
//! insert one row per (recipient, channel) and enqueue it for channel
//! dispatch. After fanning out, the listener records its consumer name on
//! the originating outbox row; once every target audience has confirmed,
//! the last listener marks the row processed. Redelivered envelopes are
//! absorbed twice over, first by the per-consumer confirmation check and
//! then by the table's unique key.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use tavola_core::channel::channels_from_json;
use tavola_core::{event_type, Audience, ChannelType};
use tavola_db::models::block::{hub_type, org_type};
use tavola_db::models::notification::NewNotification;
use tavola_db::models::recipient::Recipient;
use tavola_db::repositories::{
    EventOutboxRepo, NotificationOutboxRepo, NotificationRepo, RecipientRepo,
};
use tavola_db::DbPool;

use crate::blocks::{BlockResolver, RecipientScope};
use crate::broker::{Broker, Envelope, RecvError};
use crate::routing::target_audiences;
use crate::senders::websocket::ConnectionRegistry;

/// Fans events out to one audience's notification table.
pub struct AudienceListener {
    pool: DbPool,
    audience: Audience,
    connections: Arc<ConnectionRegistry>,
}

impl AudienceListener {
    pub fn new(pool: DbPool, audience: Audience, connections: Arc<ConnectionRegistry>) -> Self {
        Self { pool, audience, connections }
    }

    /// Run the listener loop until cancelled or the broker closes.
    pub async fn run(self, broker: Arc<Broker>, cancel: CancellationToken) {
        let mut subscription = broker.subscribe(self.audience.binding());
        tracing::info!(audience = %self.audience, "Audience listener started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(audience = %self.audience, "Audience listener stopping");
                    break;
                }
                received = subscription.recv() => match received {
                    Ok(envelope) => {
                        if let Err(e) = self.handle(&envelope).await {
                            tracing::error!(audience = %self.audience,
                                event_id = %envelope.event_id, error = %e,
                                "Fan-out failed; event stays pending for redelivery");
                        }
                    }
                    Err(RecvError::Lagged { skipped }) => {
                        // The slow poller republishes whatever we missed.
                        tracing::warn!(audience = %self.audience, skipped,
                            "Audience listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!(audience = %self.audience,
                            "Broker closed, audience listener shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fan one envelope out into notification rows. Returns the number of
    /// rows inserted.
    pub async fn handle(&self, envelope: &Envelope) -> Result<usize, sqlx::Error> {
        let consumer = self.audience.consumer_name();
        if EventOutboxRepo::is_processed_by(&self.pool, &envelope.event_id, consumer).await? {
            tracing::debug!(audience = %self.audience, event_id = %envelope.event_id,
                "Event already fanned out, skipped");
            // The completion check may have been lost to a crash between
            // our confirmation and the processed transition.
            self.complete_if_fully_consumed(envelope).await?;
            return Ok(0);
        }

        let inserted = self.fan_out(envelope).await?;

        EventOutboxRepo::record_consumer(&self.pool, &envelope.event_id, consumer).await?;
        self.complete_if_fully_consumed(envelope).await?;
        tracing::info!(audience = %self.audience, event_id = %envelope.event_id,
            event_type = %envelope.event_type, inserted, "Event fanned out");
        Ok(inserted)
    }

    async fn fan_out(&self, envelope: &Envelope) -> Result<usize, sqlx::Error> {
        let recipients = self.resolve_recipients(envelope).await?;
        if recipients.is_empty() {
            tracing::debug!(audience = %self.audience, event_id = %envelope.event_id,
                "No recipients for event");
            return Ok(0);
        }

        let (title, body) = render_message(&envelope.event_type, &envelope.payload);
        let priority = event_type::default_priority(&envelope.event_type);
        let read_by_all = event_type::is_broadcast(&envelope.event_type);
        let now = Utc::now().time();

        let mut inserted = 0;
        for recipient in recipients {
            let scope = self.scope_for(&recipient);
            let snapshot = BlockResolver::snapshot(&self.pool, &scope).await?;
            let candidates = channels_from_json(&recipient.preferred_channels);
            let channels = snapshot.resolve(&envelope.event_type, &candidates, now);

            for channel in channels {
                let row = NewNotification {
                    event_id: envelope.event_id.clone(),
                    user_id: recipient.id,
                    org_id: recipient.org_id,
                    hub_id: recipient.hub_id,
                    event_type: envelope.event_type.clone(),
                    aggregate_type: envelope.aggregate_type.clone(),
                    title: title.clone(),
                    body: body.clone(),
                    properties: envelope.payload.clone(),
                    channel: channel.as_str().to_string(),
                    priority: priority.as_str().to_string(),
                    read_by_all,
                };
                let Some(id) = NotificationRepo::insert(&self.pool, self.audience, &row).await?
                else {
                    continue;
                };
                inserted += 1;
                NotificationOutboxRepo::enqueue(
                    &self.pool,
                    id,
                    self.audience,
                    &envelope.aggregate_type,
                    envelope.aggregate_id,
                )
                .await?;

                // Best-effort live push; the channel poller settles the
                // durable send state later.
                if channel == ChannelType::Websocket {
                    self.connections.push(
                        self.audience,
                        recipient.id,
                        serde_json::json!({
                            "notification_id": id,
                            "event_type": envelope.event_type,
                            "title": title,
                            "body": body,
                        }),
                    );
                }
            }
        }
        Ok(inserted)
    }

    /// Flip the outbox row to processed once every target audience has
    /// confirmed its fan-out.
    async fn complete_if_fully_consumed(&self, envelope: &Envelope) -> Result<(), sqlx::Error> {
        let confirmed = EventOutboxRepo::list_consumers(&self.pool, &envelope.event_id).await?;
        let all_confirmed = target_audiences(&envelope.event_type)
            .iter()
            .all(|audience| confirmed.iter().any(|c| c == audience.consumer_name()));
        if all_confirmed
            && EventOutboxRepo::mark_processed(
                &self.pool,
                &envelope.event_id,
                self.audience.consumer_name(),
            )
            .await?
        {
            tracing::debug!(event_id = %envelope.event_id,
                "Every audience fanned out, outbox row processed");
        }
        Ok(())
    }

    /// Resolve the recipient set from the event payload's scope ids.
    async fn resolve_recipients(
        &self,
        envelope: &Envelope,
    ) -> Result<Vec<Recipient>, sqlx::Error> {
        match self.audience {
            Audience::Admin => RecipientRepo::list_admins(&self.pool).await,
            Audience::Restaurant => match envelope.payload["restaurant_id"].as_i64() {
                Some(restaurant_id) => {
                    RecipientRepo::list_restaurant_staff(&self.pool, restaurant_id).await
                }
                None => {
                    tracing::warn!(event_id = %envelope.event_id,
                        "Restaurant event without restaurant_id in payload");
                    Ok(Vec::new())
                }
            },
            Audience::Agency => match envelope.payload["agency_id"].as_i64() {
                Some(agency_id) => RecipientRepo::list_agency_staff(&self.pool, agency_id).await,
                None => {
                    tracing::warn!(event_id = %envelope.event_id,
                        "Agency event without agency_id in payload");
                    Ok(Vec::new())
                }
            },
            Audience::Customer => match envelope.payload["customer_id"].as_i64() {
                Some(customer_id) => Ok(RecipientRepo::get_customer(&self.pool, customer_id)
                    .await?
                    .into_iter()
                    .collect()),
                None => {
                    tracing::warn!(event_id = %envelope.event_id,
                        "Customer event without customer_id in payload");
                    Ok(Vec::new())
                }
            },
        }
    }

    fn scope_for(&self, recipient: &Recipient) -> RecipientScope {
        let (org_type, hub_type) = match self.audience {
            Audience::Restaurant => (Some(org_type::RESTAURANT), Some(hub_type::RESTAURANT_HUB)),
            Audience::Agency => (Some(org_type::AGENCY), Some(hub_type::AGENCY_HUB)),
            Audience::Admin | Audience::Customer => (None, None),
        };
        RecipientScope {
            org_type: recipient.org_id.and(org_type),
            org_id: recipient.org_id,
            hub_type: recipient.hub_id.and(hub_type),
            hub_id: recipient.hub_id,
            user_id: recipient.id,
        }
    }
}

/// Render a human-readable title/body pair for an event.
fn render_message(event_type: &str, payload: &serde_json::Value) -> (String, String) {
    let party = payload["party_size"].as_i64();
    match event_type {
        event_type::RESERVATION_REQUESTED => (
            "New reservation request".to_string(),
            match party {
                Some(n) => format!("A reservation for {n} has been requested."),
                None => "A reservation has been requested.".to_string(),
            },
        ),
        event_type::RESERVATION_CONFIRMED => (
            "Reservation confirmed".to_string(),
            "Your reservation has been confirmed.".to_string(),
        ),
        event_type::RESERVATION_CANCELLED => (
            "Reservation cancelled".to_string(),
            "A reservation has been cancelled.".to_string(),
        ),
        event_type::EVENT_CANCELLED => (
            "Event cancelled".to_string(),
            "An event you were booked for has been cancelled.".to_string(),
        ),
        event_type::NEW_ORDER => (
            "New order".to_string(),
            "A new order has arrived.".to_string(),
        ),
        event_type::CUSTOMER_REGISTERED => (
            "New customer".to_string(),
            "A new customer has registered.".to_string(),
        ),
        event_type::SERVICE_ACTIVATED => (
            "Service activated".to_string(),
            "A service has been activated for your agency.".to_string(),
        ),
        other => (other.replace('_', " ").to_lowercase(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_event_types_render_specific_messages() {
        let (title, body) =
            render_message(event_type::RESERVATION_REQUESTED, &serde_json::json!({"party_size": 4}));
        assert_eq!(title, "New reservation request");
        assert!(body.contains('4'));
    }

    #[test]
    fn unknown_event_types_render_a_generic_title() {
        let (title, _) = render_message("SOCIAL_POST_LIKED", &serde_json::json!({}));
        assert_eq!(title, "social post liked");
    }
}
