//! Event-type names, wildcard matching and broadcast classification.
//!
//! Event types are SCREAMING_SNAKE strings (`RESERVATION_REQUESTED`).
//! Block rules and admin rules may address a family of event types with a
//! trailing `*` wildcard (`SOCIAL_*`); matching is done here, in application
//! code, so the semantics stay database-neutral and unit-testable.

use crate::priority::Priority;

// Well-known event types emitted by the reservation domain. The pipeline
// itself treats event types as opaque strings; these constants exist so
// domain services and tests agree on spelling.
pub const RESERVATION_REQUESTED: &str = "RESERVATION_REQUESTED";
pub const RESERVATION_CONFIRMED: &str = "RESERVATION_CONFIRMED";
pub const RESERVATION_CANCELLED: &str = "RESERVATION_CANCELLED";
pub const EVENT_CANCELLED: &str = "EVENT_CANCELLED";
pub const NEW_ORDER: &str = "NEW_ORDER";
pub const CUSTOMER_REGISTERED: &str = "CUSTOMER_REGISTERED";
pub const SERVICE_ACTIVATED: &str = "SERVICE_ACTIVATED";

/// Match an event type against a block-rule pattern.
///
/// A pattern is either an exact event-type name or a prefix followed by a
/// single trailing `*` (`SOCIAL_*` matches `SOCIAL_POST_LIKED`). A bare `*`
/// matches everything. `*` anywhere else is not a wildcard.
pub fn matches_pattern(pattern: &str, event_type: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => event_type.starts_with(prefix),
        None => pattern == event_type,
    }
}

/// Whether notifications for this event type use shared-read semantics.
///
/// Broadcast event types address a whole team; the first staff member to
/// act reads the notification for the entire group. Individually-addressed
/// event types require each recipient to read independently.
pub fn is_broadcast(event_type: &str) -> bool {
    matches!(
        event_type,
        RESERVATION_REQUESTED | RESERVATION_CANCELLED | EVENT_CANCELLED | NEW_ORDER
            | CUSTOMER_REGISTERED
    )
}

/// Default delivery priority for an event type.
///
/// Cancellations are time-critical for the receiving team; registration and
/// service events are informational.
pub fn default_priority(event_type: &str) -> Priority {
    match event_type {
        RESERVATION_CANCELLED | EVENT_CANCELLED => Priority::High,
        CUSTOMER_REGISTERED | SERVICE_ACTIVATED => Priority::Low,
        _ => Priority::Normal,
    }
}
