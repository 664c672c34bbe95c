//! Shared domain types for the Tavola notification pipeline.
//!
//! This crate holds the pure, I/O-free building blocks used by every other
//! workspace member:
//!
//! - [`types`] — database id and timestamp aliases.
//! - [`error`] — the [`CoreError`](error::CoreError) domain error enum.
//! - [`audience`] — the four recipient populations and their routing names.
//! - [`channel`] — delivery channel types (email, SMS, push, websocket).
//! - [`priority`] — notification priority levels.
//! - [`event_type`] — event-type constants, wildcard pattern matching and
//!   the broadcast (shared-read) classification.

pub mod audience;
pub mod channel;
pub mod error;
pub mod event_type;
pub mod priority;
pub mod types;

pub use audience::Audience;
pub use channel::ChannelType;
pub use error::CoreError;
pub use priority::Priority;
