//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the create DTOs the repositories insert from.

pub mod block;
pub mod channel_send;
pub mod event_outbox;
pub mod notification;
pub mod notification_outbox;
pub mod recipient;
