//! In-process message broker with topic-exchange semantics, backed by a
//! `tokio::sync::broadcast` channel.
//!
//! Every published [`Envelope`] carries a dot-separated routing key
//! (`notification.restaurant.NEW_ORDER`); a [`Subscription`] filters the
//! broadcast stream against its binding pattern, where a `*` segment
//! matches exactly one key segment. Messages with no matching live
//! subscriber are dropped; the persisted outbox state is what makes
//! redelivery safe, not the broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tavola_core::types::{DbId, Timestamp};

/// Routing key for channel-dispatch messages (level 2 → level 3).
pub const DISPATCH_KEY: &str = "notification.channel.dispatch";

/// Routing key for messages that exhausted every retry budget.
pub const DEAD_LETTER_KEY: &str = "notification.dead-letter";

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A message in flight between pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Dot-separated routing key the message was published with.
    pub routing_key: String,

    /// The originating event's globally unique id. Downstream idempotency
    /// keys derive from it.
    pub event_id: String,

    /// Domain event type (`RESERVATION_REQUESTED`, …).
    pub event_type: String,

    /// Kind of the aggregate the event happened on (`reservation`, …).
    pub aggregate_type: String,

    /// Database id of the aggregate.
    pub aggregate_id: DbId,

    /// Event-specific JSON payload.
    pub payload: serde_json::Value,

    /// When the envelope was published (UTC).
    pub published_at: Timestamp,
}

impl Envelope {
    /// Re-wrap this envelope under the dead-letter key, keeping the
    /// original routing key in the payload for operators.
    pub fn into_dead_letter(mut self, reason: &str) -> Envelope {
        self.payload = serde_json::json!({
            "original_routing_key": self.routing_key,
            "reason": reason,
            "payload": self.payload,
        });
        self.routing_key = DEAD_LETTER_KEY.to_string();
        self
    }
}

// ---------------------------------------------------------------------------
// Binding match
// ---------------------------------------------------------------------------

/// Match a routing key against a binding pattern, segment-wise.
///
/// `notification.restaurant.*` matches `notification.restaurant.NEW_ORDER`
/// but not `notification.customer.NEW_ORDER` or
/// `notification.restaurant.a.b`. A `*` matches exactly one segment.
pub fn binding_matches(binding: &str, routing_key: &str) -> bool {
    let mut pattern = binding.split('.');
    let mut key = routing_key.split('.');
    loop {
        match (pattern.next(), key.next()) {
            (None, None) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(k)) if p == k => continue,
            _ => return false,
        }
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// In-process topic broker. Shared via `Arc<Broker>`.
///
/// Live subscription bindings are tracked so that `publish` can report how
/// many subscriptions actually match a routing key, not merely how many
/// receivers hang off the broadcast channel.
pub struct Broker {
    sender: broadcast::Sender<Envelope>,
    bindings: Arc<Mutex<HashMap<u64, String>>>,
    next_subscription_id: AtomicU64,
}

impl Broker {
    /// Create a broker with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are dropped
    /// and slow subscribers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            bindings: Arc::new(Mutex::new(HashMap::new())),
            next_subscription_id: AtomicU64::new(0),
        }
    }

    /// Publish an envelope to every subscription whose binding matches.
    ///
    /// Returns the number of live subscriptions whose binding matches the
    /// envelope's routing key; zero means the message went nowhere and the
    /// publisher must keep its durable row pending.
    pub fn publish(&self, envelope: Envelope) -> usize {
        let matching = self
            .bindings
            .lock()
            .unwrap()
            .values()
            .filter(|binding| binding_matches(binding, &envelope.routing_key))
            .count();
        if matching > 0 {
            // SendError only means there are zero receivers.
            let _ = self.sender.send(envelope);
        }
        matching
    }

    /// Subscribe with a binding pattern. The binding is released when the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe(&self, binding: impl Into<String>) -> Subscription {
        let binding = binding.into();
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        self.bindings.lock().unwrap().insert(id, binding.clone());
        Subscription {
            binding,
            receiver: self.sender.subscribe(),
            id,
            bindings: self.bindings.clone(),
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A filtered view of the broadcast stream.
pub struct Subscription {
    binding: String,
    receiver: broadcast::Receiver<Envelope>,
    id: u64,
    bindings: Arc<Mutex<HashMap<u64, String>>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bindings.lock().unwrap().remove(&self.id);
    }
}

/// Why a [`Subscription::recv`] call yielded no message.
#[derive(Debug, PartialEq, Eq)]
pub enum RecvError {
    /// The broker was dropped; the subscriber should shut down.
    Closed,
    /// The subscriber fell behind and `skipped` messages were discarded.
    Lagged { skipped: u64 },
}

impl Subscription {
    /// Receive the next envelope whose routing key matches this binding.
    ///
    /// Non-matching envelopes are skipped silently.
    pub async fn recv(&mut self) -> Result<Envelope, RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if binding_matches(&self.binding, &envelope.routing_key) => {
                    return Ok(envelope);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(RecvError::Closed),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(RecvError::Lagged { skipped });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn envelope(routing_key: &str) -> Envelope {
        Envelope {
            routing_key: routing_key.to_string(),
            event_id: "evt-1".to_string(),
            event_type: "NEW_ORDER".to_string(),
            aggregate_type: "order".to_string(),
            aggregate_id: 1,
            payload: serde_json::json!({}),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn binding_star_matches_one_segment() {
        assert!(binding_matches(
            "notification.restaurant.*",
            "notification.restaurant.NEW_ORDER"
        ));
        assert!(!binding_matches(
            "notification.restaurant.*",
            "notification.customer.NEW_ORDER"
        ));
        assert!(!binding_matches(
            "notification.restaurant.*",
            "notification.restaurant.a.b"
        ));
        assert!(binding_matches(
            "notification.*.NEW_ORDER",
            "notification.admin.NEW_ORDER"
        ));
        assert!(binding_matches(DISPATCH_KEY, DISPATCH_KEY));
    }

    #[tokio::test]
    async fn subscription_filters_by_binding() {
        let broker = Broker::default();
        let mut restaurant = broker.subscribe("notification.restaurant.*");
        let mut admin = broker.subscribe("notification.admin.*");

        broker.publish(envelope("notification.restaurant.NEW_ORDER"));
        broker.publish(envelope("notification.admin.NEW_ORDER"));

        let got = restaurant.recv().await.unwrap();
        assert_eq!(got.routing_key, "notification.restaurant.NEW_ORDER");
        let got = admin.recv().await.unwrap();
        assert_eq!(got.routing_key, "notification.admin.NEW_ORDER");
    }

    #[tokio::test]
    async fn every_matching_subscriber_receives_the_message() {
        let broker = Broker::default();
        let mut a = broker.subscribe("notification.restaurant.*");
        let mut b = broker.subscribe("notification.*.NEW_ORDER");

        broker.publish(envelope("notification.restaurant.NEW_ORDER"));

        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[test]
    fn publish_without_subscribers_reports_zero() {
        let broker = Broker::default();
        assert_eq!(broker.publish(envelope("notification.admin.NEW_ORDER")), 0);
    }

    #[test]
    fn publish_counts_only_matching_bindings() {
        let broker = Broker::default();
        // A dispatch subscriber must not make an audience key look consumed.
        let _dispatch = broker.subscribe(DISPATCH_KEY);
        assert_eq!(broker.publish(envelope("notification.restaurant.NEW_ORDER")), 0);
        assert_eq!(broker.publish(envelope(DISPATCH_KEY)), 1);
    }

    #[test]
    fn dropped_subscription_releases_its_binding() {
        let broker = Broker::default();
        let subscription = broker.subscribe("notification.restaurant.*");
        assert_eq!(broker.publish(envelope("notification.restaurant.NEW_ORDER")), 1);
        drop(subscription);
        assert_eq!(broker.publish(envelope("notification.restaurant.NEW_ORDER")), 0);
    }

    #[test]
    fn dead_letter_keeps_original_routing_key() {
        let dead = envelope("notification.admin.NEW_ORDER").into_dead_letter("retries exhausted");
        assert_eq!(dead.routing_key, DEAD_LETTER_KEY);
        assert_eq!(
            dead.payload["original_routing_key"],
            "notification.admin.NEW_ORDER"
        );
        assert_eq!(dead.payload["reason"], "retries exhausted");
    }
}
