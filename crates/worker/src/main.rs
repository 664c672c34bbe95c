//! Notification pipeline worker.
//!
//! Wires the whole delivery chain together: one broker, the event-outbox
//! pollers, four audience listeners, the notification-outbox poller, the
//! dispatch listener, the channel pollers, the retry selector and the
//! retention job. Ctrl-C cancels every task through a shared token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tavola_core::{Audience, ChannelType};
use tavola_notify::senders::email::{EmailConfig, EmailSender};
use tavola_notify::senders::push::{PushConfig, PushSender};
use tavola_notify::senders::sms::{SmsConfig, SmsSender};
use tavola_notify::senders::websocket::{ConnectionRegistry, WebsocketSender};
use tavola_notify::{
    AudienceListener, Broker, ChannelPoller, DispatchListener, EventOutboxPoller, NotifyConfig,
    NotificationOutboxPoller, SenderRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tavola_worker=debug,tavola_notify=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = tavola_db::connect(&database_url).await?;
    tavola_db::migrate(&pool).await?;
    tavola_db::health_check(&pool).await?;
    tracing::info!("Database ready");

    let config = NotifyConfig::from_env();
    let broker = Arc::new(Broker::default());
    let connections = Arc::new(ConnectionRegistry::new());
    let senders = Arc::new(build_senders(connections.clone()));
    let cancel = CancellationToken::new();

    let mut tasks = tokio::task::JoinSet::new();

    for audience in Audience::ALL {
        let listener = AudienceListener::new(pool.clone(), audience, connections.clone());
        tasks.spawn(listener.run(broker.clone(), cancel.clone()));
    }
    tasks.spawn(DispatchListener::new(pool.clone()).run(broker.clone(), cancel.clone()));

    tasks.spawn(
        EventOutboxPoller::new(pool.clone(), broker.clone(), config.clone())
            .run_fast(cancel.clone()),
    );
    tasks.spawn(
        NotificationOutboxPoller::new(pool.clone(), broker.clone(), config.clone())
            .run(cancel.clone()),
    );
    tasks.spawn(
        ChannelPoller::new(pool.clone(), broker.clone(), senders.clone(), config.clone())
            .run_fast(cancel.clone()),
    );
    if config.slow_poller_enabled {
        tasks.spawn(
            EventOutboxPoller::new(pool.clone(), broker.clone(), config.clone())
                .run_slow(cancel.clone()),
        );
        tasks.spawn(
            ChannelPoller::new(pool.clone(), broker.clone(), senders.clone(), config.clone())
                .run_slow(cancel.clone()),
        );
    }
    tasks.spawn(tavola_notify::channel::run_retry_selector(
        pool.clone(),
        config.clone(),
        cancel.clone(),
    ));
    tasks.spawn(tavola_notify::retention::run(pool.clone(), config.clone(), cancel.clone()));

    tracing::info!("Notification pipeline running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    cancel.cancel();
    while tasks.join_next().await.is_some() {}
    tracing::info!("All pipeline tasks stopped");
    Ok(())
}

/// Build the sender registry from whatever channels the environment
/// configures. Websocket is always available; the external transports are
/// registered only when their gateway variables are set.
fn build_senders(connections: Arc<ConnectionRegistry>) -> SenderRegistry {
    let mut registry = SenderRegistry::new()
        .register(ChannelType::Websocket, Box::new(WebsocketSender::new(connections)));

    match EmailConfig::from_env() {
        Some(config) => {
            registry = registry.register(ChannelType::Email, Box::new(EmailSender::new(config)));
        }
        None => tracing::warn!("SMTP_HOST not set, EMAIL channel disabled"),
    }
    match SmsConfig::from_env() {
        Some(config) => {
            registry = registry.register(ChannelType::Sms, Box::new(SmsSender::new(config)));
        }
        None => tracing::warn!("SMS_GATEWAY_URL not set, SMS channel disabled"),
    }
    match PushConfig::from_env() {
        Some(config) => {
            registry = registry.register(ChannelType::Push, Box::new(PushSender::new(config)));
        }
        None => tracing::warn!("PUSH_GATEWAY_URL not set, PUSH channel disabled"),
    }
    registry
}
