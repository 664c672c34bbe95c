//! Recipient audiences.
//!
//! Every domain event fans out to one or more audiences; each audience has
//! its own notification table, broker queue and listener consumer name so
//! that the four populations are processed independently.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A recipient population addressed by the notification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
    /// Platform administrators.
    Admin,
    /// Staff of a single restaurant.
    Restaurant,
    /// An individual customer.
    Customer,
    /// Staff of a booking agency.
    Agency,
}

impl Audience {
    /// All audiences, in listener spawn order.
    pub const ALL: [Audience; 4] = [
        Audience::Admin,
        Audience::Restaurant,
        Audience::Customer,
        Audience::Agency,
    ];

    /// The database/string representation of the audience.
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Admin => "ADMIN",
            Audience::Restaurant => "RESTAURANT",
            Audience::Customer => "CUSTOMER",
            Audience::Agency => "AGENCY",
        }
    }

    /// Parse an audience from its database/string representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "ADMIN" => Ok(Audience::Admin),
            "RESTAURANT" => Ok(Audience::Restaurant),
            "CUSTOMER" => Ok(Audience::Customer),
            "AGENCY" => Ok(Audience::Agency),
            other => Err(CoreError::UnknownAudience(other.to_string())),
        }
    }

    /// The notification table backing this audience.
    pub fn table(&self) -> &'static str {
        match self {
            Audience::Admin => "admin_notifications",
            Audience::Restaurant => "restaurant_notifications",
            Audience::Customer => "customer_notifications",
            Audience::Agency => "agency_notifications",
        }
    }

    /// The broker binding the audience listener subscribes with.
    ///
    /// Routing keys are `notification.<audience>.<event_type>`, so the
    /// binding matches every event type addressed to this audience.
    pub fn binding(&self) -> &'static str {
        match self {
            Audience::Admin => "notification.admin.*",
            Audience::Restaurant => "notification.restaurant.*",
            Audience::Customer => "notification.customer.*",
            Audience::Agency => "notification.agency.*",
        }
    }

    /// The routing key an event addressed to this audience is published with.
    pub fn routing_key(&self, event_type: &str) -> String {
        let segment = match self {
            Audience::Admin => "admin",
            Audience::Restaurant => "restaurant",
            Audience::Customer => "customer",
            Audience::Agency => "agency",
        };
        format!("notification.{segment}.{event_type}")
    }

    /// The `processed_by` consumer name the audience listener records on
    /// event-outbox rows. One value per listener lets several independent
    /// consumers each process the same row exactly once.
    pub fn consumer_name(&self) -> &'static str {
        match self {
            Audience::Admin => "ADMIN_NOTIFICATION_LISTENER",
            Audience::Restaurant => "RESTAURANT_NOTIFICATION_LISTENER",
            Audience::Customer => "CUSTOMER_NOTIFICATION_LISTENER",
            Audience::Agency => "AGENCY_NOTIFICATION_LISTENER",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_all_audiences() {
        for audience in Audience::ALL {
            assert_eq!(Audience::parse(audience.as_str()).unwrap(), audience);
        }
    }

    #[test]
    fn routing_key_carries_audience_and_event_type() {
        assert_eq!(
            Audience::Restaurant.routing_key("RESERVATION_REQUESTED"),
            "notification.restaurant.RESERVATION_REQUESTED"
        );
    }

    #[test]
    fn tables_are_distinct() {
        let tables: std::collections::HashSet<_> =
            Audience::ALL.iter().map(|a| a.table()).collect();
        assert_eq!(tables.len(), Audience::ALL.len());
    }
}
