//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or `&mut PgConnection` where the caller's transaction
//! matters) as the first argument.

pub mod block_repo;
pub mod channel_send_repo;
pub mod event_outbox_repo;
pub mod notification_outbox_repo;
pub mod notification_repo;
pub mod recipient_repo;

pub use block_repo::BlockRepo;
pub use channel_send_repo::ChannelSendRepo;
pub use event_outbox_repo::EventOutboxRepo;
pub use notification_outbox_repo::NotificationOutboxRepo;
pub use notification_repo::NotificationRepo;
pub use recipient_repo::RecipientRepo;
