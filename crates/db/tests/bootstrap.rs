use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify schema.
#[sqlx::test(migrations = "./migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    tavola_db::health_check(&pool).await.unwrap();

    let tables = [
        "event_outbox",
        "admin_notifications",
        "restaurant_notifications",
        "customer_notifications",
        "agency_notifications",
        "notification_outbox",
        "notification_channel_sends",
        "global_notification_blocks",
        "organization_notification_blocks",
        "hub_notification_blocks",
        "user_notification_blocks",
        "event_type_notification_rules",
    ];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should start empty");
    }
}

/// The four audience tables must not share an id sequence; ids restart at 1
/// in each.
#[sqlx::test(migrations = "./migrations")]
async fn test_audience_tables_have_independent_sequences(pool: PgPool) {
    for table in [
        "admin_notifications",
        "restaurant_notifications",
        "customer_notifications",
        "agency_notifications",
    ] {
        let id: (i64,) = sqlx::query_as(&format!(
            "INSERT INTO {table} \
                (event_id, user_id, event_type, aggregate_type, title, body, channel) \
             VALUES ('evt-{table}', 1, 'RESERVATION_REQUESTED', 'reservation', 't', 'b', 'EMAIL') \
             RETURNING id"
        ))
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(id.0, 1, "{table} first id");
    }
}
