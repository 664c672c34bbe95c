//! Delivery channel types.
//!
//! These must match the values stored in the
//! `notification_channel_sends.channel_type` and `*_notifications.channel`
//! columns and referenced by the channel poller and block resolver.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A delivery medium for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    /// Email via SMTP.
    Email,
    /// SMS via the SMS gateway.
    Sms,
    /// Mobile push via the push gateway (FCM-style).
    Push,
    /// Real-time in-app push. Best-effort, never retried.
    Websocket,
}

impl ChannelType {
    /// All channels, in the order the channel poller iterates them.
    pub const ALL: [ChannelType; 4] = [
        ChannelType::Email,
        ChannelType::Sms,
        ChannelType::Push,
        ChannelType::Websocket,
    ];

    /// The database/string representation of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "EMAIL",
            ChannelType::Sms => "SMS",
            ChannelType::Push => "PUSH",
            ChannelType::Websocket => "WEBSOCKET",
        }
    }

    /// Parse a channel from its database/string representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "EMAIL" => Ok(ChannelType::Email),
            "SMS" => Ok(ChannelType::Sms),
            "PUSH" => Ok(ChannelType::Push),
            "WEBSOCKET" => Ok(ChannelType::Websocket),
            other => Err(CoreError::UnknownChannel(other.to_string())),
        }
    }

    /// Whether delivery over this channel is fire-and-forget.
    ///
    /// Websocket sends are never retried and are marked sent on dispatch
    /// regardless of client connectivity.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, ChannelType::Websocket)
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a JSON array of channel names (as stored in `blocked_channels` /
/// `preferred_channels` / `mandatory_channels` columns) into channel types.
///
/// Unknown names are skipped with a warning left to the caller; a malformed
/// or empty value yields an empty list.
pub fn channels_from_json(value: &serde_json::Value) -> Vec<ChannelType> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| ChannelType::parse(s).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Encode a channel list as the JSON array stored in channel-list columns.
pub fn channels_to_json(channels: &[ChannelType]) -> serde_json::Value {
    serde_json::Value::Array(
        channels
            .iter()
            .map(|c| serde_json::Value::String(c.as_str().to_string()))
            .collect(),
    )
}
