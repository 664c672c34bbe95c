//! Periodic purge of terminal pipeline rows.
//!
//! Removes processed event-outbox rows, published notification-outbox
//! rows, read or terminally failed notifications and settled channel
//! sends once they age past the retention window. Pending work is never
//! touched.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use tavola_core::Audience;
use tavola_db::repositories::{
    ChannelSendRepo, EventOutboxRepo, NotificationOutboxRepo, NotificationRepo,
};
use tavola_db::DbPool;

use crate::config::NotifyConfig;

/// Run the retention loop until cancelled.
pub async fn run(pool: DbPool, config: NotifyConfig, cancel: CancellationToken) {
    tracing::info!(
        retention_hours = config.retention_hours,
        interval_secs = config.retention_interval_secs,
        "Retention job started"
    );
    let mut interval = tokio::time::interval(Duration::from_secs(config.retention_interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention job stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = purge_once(&pool, &config).await {
                    tracing::error!(error = %e, "Retention purge failed");
                }
            }
        }
    }
}

/// One purge pass over every pipeline table. Returns total rows removed.
pub async fn purge_once(pool: &DbPool, config: &NotifyConfig) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - chrono::Duration::hours(config.retention_hours);
    let mut removed = 0;

    removed += EventOutboxRepo::purge_processed_before(pool, cutoff).await?;
    removed += NotificationOutboxRepo::purge_published_before(pool, cutoff).await?;
    for audience in Audience::ALL {
        removed += NotificationRepo::purge_terminal_before(pool, audience, cutoff).await?;
    }
    removed +=
        ChannelSendRepo::purge_terminal_before(pool, cutoff, config.max_send_attempts).await?;

    if removed > 0 {
        tracing::info!(removed, "Retention: purged terminal rows");
    } else {
        tracing::debug!("Retention: nothing to purge");
    }
    Ok(removed)
}
