//! Channel senders: the seam between the pipeline and external delivery
//! infrastructure.
//!
//! Each channel implements [`ChannelSender`]; the channel poller looks the
//! sender up in a [`SenderRegistry`] by channel type. A channel with no
//! registered sender is unconfigured, and its rows fail permanently with a
//! clear error instead of burning retries.

pub mod email;
pub mod push;
pub mod sms;
pub mod websocket;

use std::collections::HashMap;

use async_trait::async_trait;
use tavola_core::types::DbId;
use tavola_core::{Audience, ChannelType};

/// Delivery addresses for one recipient, resolved at send time.
#[derive(Debug, Clone)]
pub struct RecipientAddress {
    pub audience: Audience,
    pub user_id: DbId,
    pub email: String,
    pub phone: Option<String>,
    pub device_token: Option<String>,
}

/// Why a send attempt did not deliver.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Infrastructure failure worth retrying (timeout, 5xx, SMTP outage).
    #[error("transient send failure: {0}")]
    Transient(String),

    /// Recipient-side failure that will never succeed (invalid address,
    /// missing device token). Terminal immediately.
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

/// One delivery channel's transport.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Deliver one notification to one recipient.
    async fn send(
        &self,
        to: &RecipientAddress,
        title: &str,
        body: &str,
        properties: &serde_json::Value,
    ) -> Result<(), SendError>;
}

/// Channel-type → sender lookup, built once at startup from whatever is
/// configured in the environment.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<ChannelType, Box<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, channel: ChannelType, sender: Box<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    pub fn get(&self, channel: ChannelType) -> Option<&dyn ChannelSender> {
        self.senders.get(&channel).map(Box::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSender;

    #[async_trait]
    impl ChannelSender for NullSender {
        async fn send(
            &self,
            _to: &RecipientAddress,
            _title: &str,
            _body: &str,
            _properties: &serde_json::Value,
        ) -> Result<(), SendError> {
            Ok(())
        }
    }

    #[test]
    fn registry_returns_registered_senders_only() {
        let registry = SenderRegistry::new().register(ChannelType::Email, Box::new(NullSender));
        assert!(registry.get(ChannelType::Email).is_some());
        assert!(registry.get(ChannelType::Sms).is_none());
    }
}
