//! Event-type to audience routing.
//!
//! The outbox poller publishes one envelope per target audience; the
//! mapping here decides which populations an event type addresses.

use tavola_core::{event_type, Audience};

/// The audiences an event type is published to.
///
/// Unknown event types surface to the admin audience so nothing silently
/// disappears; a misrouted event shows up in the operators' feed instead.
pub fn target_audiences(event_type: &str) -> &'static [Audience] {
    match event_type {
        event_type::RESERVATION_REQUESTED | event_type::NEW_ORDER => {
            &[Audience::Restaurant, Audience::Admin]
        }
        event_type::RESERVATION_CONFIRMED | event_type::RESERVATION_CANCELLED => {
            &[Audience::Restaurant, Audience::Customer, Audience::Admin]
        }
        event_type::EVENT_CANCELLED => {
            &[Audience::Customer, Audience::Restaurant, Audience::Admin]
        }
        event_type::CUSTOMER_REGISTERED => &[Audience::Admin],
        event_type::SERVICE_ACTIVATED => &[Audience::Agency, Audience::Admin],
        _ => &[Audience::Admin],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_reach_restaurant_and_admin() {
        assert_eq!(
            target_audiences(event_type::NEW_ORDER),
            &[Audience::Restaurant, Audience::Admin]
        );
    }

    #[test]
    fn cancellations_reach_the_customer_too() {
        assert!(target_audiences(event_type::RESERVATION_CANCELLED)
            .contains(&Audience::Customer));
    }

    #[test]
    fn unknown_event_types_fall_back_to_admin() {
        assert_eq!(target_audiences("SOMETHING_NEW"), &[Audience::Admin]);
    }
}
