//! Best-effort in-app delivery through live websocket connections.
//!
//! The pipeline never owns sockets; it pushes JSON frames into a
//! [`ConnectionRegistry`] that the websocket server layer populates with
//! per-user channels. A recipient without an open connection is a
//! successful send: the durable notification row is what the client
//! fetches on reconnect.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tavola_core::types::DbId;
use tavola_core::Audience;

use super::{ChannelSender, RecipientAddress, SendError};

/// Live websocket connections, keyed by audience and user id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<(Audience, DbId), mpsc::UnboundedSender<serde_json::Value>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's connection, replacing any previous one.
    pub fn connect(
        &self,
        audience: Audience,
        user_id: DbId,
    ) -> mpsc::UnboundedReceiver<serde_json::Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .write()
            .expect("connection registry lock poisoned")
            .insert((audience, user_id), tx);
        rx
    }

    /// Drop a user's connection.
    pub fn disconnect(&self, audience: Audience, user_id: DbId) {
        self.connections
            .write()
            .expect("connection registry lock poisoned")
            .remove(&(audience, user_id));
    }

    /// Push a frame to a user's connection, if one is open.
    ///
    /// Returns whether a live connection received the frame. A closed or
    /// absent connection is not an error.
    pub fn push(&self, audience: Audience, user_id: DbId, frame: serde_json::Value) -> bool {
        let connections = self
            .connections
            .read()
            .expect("connection registry lock poisoned");
        match connections.get(&(audience, user_id)) {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}

/// Fire-and-forget websocket sender.
///
/// Always reports success; connectivity is best-effort by contract.
pub struct WebsocketSender {
    registry: std::sync::Arc<ConnectionRegistry>,
}

impl WebsocketSender {
    pub fn new(registry: std::sync::Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ChannelSender for WebsocketSender {
    async fn send(
        &self,
        to: &RecipientAddress,
        title: &str,
        body: &str,
        properties: &serde_json::Value,
    ) -> Result<(), SendError> {
        let delivered = self.registry.push(
            to.audience,
            to.user_id,
            serde_json::json!({
                "title": title,
                "body": body,
                "properties": properties,
            }),
        );
        tracing::debug!(user_id = to.user_id, delivered, "Websocket frame pushed");
        Ok(())
    }
}
