//! Tavola notification delivery pipeline.
//!
//! Events recorded in a business transaction travel through four durable
//! levels before reaching a recipient:
//!
//! - **L0** — [`outbox::record_event`] appends to `event_outbox`; the
//!   [`EventOutboxPoller`] publishes committed rows to the [`Broker`].
//! - **L1** — one [`AudienceListener`] per audience fans each event out
//!   into per-(recipient, channel) notification rows, filtered through the
//!   [`blocks`] hierarchy, and enqueues them on `notification_outbox`.
//! - **L2** — the [`NotificationOutboxPoller`] publishes dispatch messages;
//!   the [`DispatchListener`] creates per-channel tracking rows.
//! - **L3** — the [`ChannelPoller`] claims tracking rows and delivers them
//!   through the [`senders`], isolating failures per channel.
//!
//! Every hop is idempotent, so redelivery anywhere in the chain is safe.

pub mod blocks;
pub mod broker;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod listener;
pub mod outbox;
pub mod read;
pub mod retention;
pub mod routing;
pub mod senders;

pub use blocks::{BlockResolver, BlockSnapshot, RecipientScope};
pub use broker::{Broker, Envelope};
pub use channel::ChannelPoller;
pub use config::NotifyConfig;
pub use dispatch::{DispatchListener, NotificationOutboxPoller};
pub use listener::AudienceListener;
pub use outbox::EventOutboxPoller;
pub use senders::{ChannelSender, RecipientAddress, SendError, SenderRegistry};
