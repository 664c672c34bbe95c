//! SMS delivery via an HTTP gateway.
//!
//! POSTs a JSON body to the configured gateway URL. Retry policy lives in
//! the channel poller, not here: one call is one attempt.

use std::time::Duration;

use async_trait::async_trait;

use super::{ChannelSender, RecipientAddress, SendError};

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the SMS gateway sender.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    /// Gateway endpoint URL.
    pub gateway_url: String,
    /// Bearer token for the gateway, if it requires one.
    pub api_key: Option<String>,
    /// Sender name or number shown to the recipient.
    pub sender_id: String,
}

impl SmsConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMS_GATEWAY_URL` is not set.
    ///
    /// | Variable          | Required | Default  |
    /// |-------------------|----------|----------|
    /// | `SMS_GATEWAY_URL` | yes      | —        |
    /// | `SMS_API_KEY`     | no       | —        |
    /// | `SMS_SENDER_ID`   | no       | `Tavola` |
    pub fn from_env() -> Option<Self> {
        let gateway_url = std::env::var("SMS_GATEWAY_URL").ok()?;
        Some(Self {
            gateway_url,
            api_key: std::env::var("SMS_API_KEY").ok(),
            sender_id: std::env::var("SMS_SENDER_ID").unwrap_or_else(|_| "Tavola".to_string()),
        })
    }
}

/// Sends notification texts through the SMS gateway.
pub struct SmsSender {
    config: SmsConfig,
    client: reqwest::Client,
}

impl SmsSender {
    pub fn new(config: SmsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { config, client }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    async fn send(
        &self,
        to: &RecipientAddress,
        title: &str,
        body: &str,
        _properties: &serde_json::Value,
    ) -> Result<(), SendError> {
        let Some(phone) = &to.phone else {
            return Err(SendError::Permanent("recipient has no phone number".to_string()));
        };

        let mut request = self.client.post(&self.config.gateway_url).json(&serde_json::json!({
            "from": self.config.sender_id,
            "to": phone,
            "text": format!("{title}: {body}"),
        }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SendError::Transient(e.to_string()))?;
        let status = response.status();
        if status.is_client_error() {
            // Rejected number, bad request: retrying will not help.
            return Err(SendError::Permanent(format!("gateway returned HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SendError::Transient(format!("gateway returned HTTP {status}")));
        }

        tracing::info!(to = %phone, "Notification SMS sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sender() -> SmsSender {
        SmsSender::new(SmsConfig {
            gateway_url: "http://localhost:1/sms".to_string(),
            api_key: None,
            sender_id: "Tavola".to_string(),
        })
    }

    #[test]
    fn from_env_returns_none_without_gateway_url() {
        std::env::remove_var("SMS_GATEWAY_URL");
        assert!(SmsConfig::from_env().is_none());
    }

    #[tokio::test]
    async fn missing_phone_is_permanent() {
        let to = RecipientAddress {
            audience: tavola_core::Audience::Customer,
            user_id: 1,
            email: "user@example.com".to_string(),
            phone: None,
            device_token: None,
        };
        let err = sender().send(&to, "t", "b", &serde_json::json!({})).await.unwrap_err();
        assert_matches!(err, SendError::Permanent(_));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_transient() {
        let to = RecipientAddress {
            audience: tavola_core::Audience::Customer,
            user_id: 1,
            email: "user@example.com".to_string(),
            phone: Some("+3912345678".to_string()),
            device_token: None,
        };
        let err = sender().send(&to, "t", "b", &serde_json::json!({})).await.unwrap_err();
        assert_matches!(err, SendError::Transient(_));
    }
}
