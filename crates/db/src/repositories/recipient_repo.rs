//! Read-only access to the recipient directory.
//!
//! The directory tables are owned by the wider platform; fan-out only
//! resolves audiences against them. All lookups exclude inactive rows.

use sqlx::PgPool;
use tavola_core::types::DbId;
use tavola_core::Audience;

use crate::models::recipient::Recipient;

/// Provides recipient-set resolution for the audience listeners.
pub struct RecipientRepo;

impl RecipientRepo {
    /// One recipient by id within an audience directory. Used at send time
    /// to resolve delivery addresses.
    pub async fn get(
        pool: &PgPool,
        audience: Audience,
        user_id: DbId,
    ) -> Result<Option<Recipient>, sqlx::Error> {
        let query = match audience {
            Audience::Admin => {
                "SELECT id, NULL::bigint AS org_id, NULL::bigint AS hub_id, \
                        email, phone, device_token, preferred_channels \
                 FROM admin_users WHERE active AND id = $1"
            }
            Audience::Restaurant => {
                "SELECT id, restaurant_id AS org_id, hub_id, \
                        email, phone, device_token, preferred_channels \
                 FROM restaurant_staff WHERE active AND id = $1"
            }
            Audience::Agency => {
                "SELECT id, agency_id AS org_id, hub_id, \
                        email, phone, device_token, preferred_channels \
                 FROM agency_staff WHERE active AND id = $1"
            }
            Audience::Customer => {
                "SELECT id, NULL::bigint AS org_id, NULL::bigint AS hub_id, \
                        email, phone, device_token, preferred_channels \
                 FROM customers WHERE active AND id = $1"
            }
        };
        sqlx::query_as::<_, Recipient>(query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// All active platform administrators.
    pub async fn list_admins(pool: &PgPool) -> Result<Vec<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            "SELECT id, NULL::bigint AS org_id, NULL::bigint AS hub_id, \
                    email, phone, device_token, preferred_channels \
             FROM admin_users WHERE active",
        )
        .fetch_all(pool)
        .await
    }

    /// All active staff of one restaurant.
    pub async fn list_restaurant_staff(
        pool: &PgPool,
        restaurant_id: DbId,
    ) -> Result<Vec<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            "SELECT id, restaurant_id AS org_id, hub_id, \
                    email, phone, device_token, preferred_channels \
             FROM restaurant_staff WHERE active AND restaurant_id = $1",
        )
        .bind(restaurant_id)
        .fetch_all(pool)
        .await
    }

    /// All active staff of one agency.
    pub async fn list_agency_staff(
        pool: &PgPool,
        agency_id: DbId,
    ) -> Result<Vec<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            "SELECT id, agency_id AS org_id, hub_id, \
                    email, phone, device_token, preferred_channels \
             FROM agency_staff WHERE active AND agency_id = $1",
        )
        .bind(agency_id)
        .fetch_all(pool)
        .await
    }

    /// One customer by id. Customer notifications address a single
    /// recipient, never a staff set.
    pub async fn get_customer(
        pool: &PgPool,
        customer_id: DbId,
    ) -> Result<Option<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            "SELECT id, NULL::bigint AS org_id, NULL::bigint AS hub_id, \
                    email, phone, device_token, preferred_channels \
             FROM customers WHERE active AND id = $1",
        )
        .bind(customer_id)
        .fetch_optional(pool)
        .await
    }
}
