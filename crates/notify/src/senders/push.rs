//! Mobile push delivery via an FCM-style HTTP gateway.

use std::time::Duration;

use async_trait::async_trait;

use super::{ChannelSender, RecipientAddress, SendError};

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the push gateway sender.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Gateway endpoint URL.
    pub gateway_url: String,
    /// Server key for the gateway, if it requires one.
    pub api_key: Option<String>,
}

impl PushConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `PUSH_GATEWAY_URL` is not set.
    ///
    /// | Variable           | Required | Default |
    /// |--------------------|----------|---------|
    /// | `PUSH_GATEWAY_URL` | yes      | —       |
    /// | `PUSH_API_KEY`     | no       | —       |
    pub fn from_env() -> Option<Self> {
        let gateway_url = std::env::var("PUSH_GATEWAY_URL").ok()?;
        Some(Self {
            gateway_url,
            api_key: std::env::var("PUSH_API_KEY").ok(),
        })
    }
}

/// Sends mobile push notifications through the push gateway.
pub struct PushSender {
    config: PushConfig,
    client: reqwest::Client,
}

impl PushSender {
    pub fn new(config: PushConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { config, client }
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    async fn send(
        &self,
        to: &RecipientAddress,
        title: &str,
        body: &str,
        properties: &serde_json::Value,
    ) -> Result<(), SendError> {
        let Some(token) = &to.device_token else {
            return Err(SendError::Permanent("recipient has no device token".to_string()));
        };

        let mut request = self.client.post(&self.config.gateway_url).json(&serde_json::json!({
            "to": token,
            "notification": { "title": title, "body": body },
            "data": properties,
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
            // Expired or unregistered token: retrying will not help.
            return Err(SendError::Permanent(format!("gateway returned HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SendError::Transient(format!("gateway returned HTTP {status}")));
        }

        tracing::info!(user_id = to.user_id, "Notification push sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn from_env_returns_none_without_gateway_url() {
        std::env::remove_var("PUSH_GATEWAY_URL");
        assert!(PushConfig::from_env().is_none());
    }

    #[tokio::test]
    async fn missing_device_token_is_permanent() {
        let sender = PushSender::new(PushConfig {
            gateway_url: "http://localhost:1/push".to_string(),
            api_key: None,
        });
        let to = RecipientAddress {
            audience: tavola_core::Audience::Customer,
            user_id: 1,
            email: "user@example.com".to_string(),
            phone: None,
            device_token: None,
        };
        let err = sender.send(&to, "t", "b", &serde_json::json!({})).await.unwrap_err();
        assert_matches!(err, SendError::Permanent(_));
    }
}
