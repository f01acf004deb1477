//! Outbound message delivery to connected clients.
//!
//! The engine never writes to a socket directly: each connection registers
//! an unbounded sender whose receiving end is drained by that connection's
//! writer task. Sends therefore never block intent handling, and a slow or
//! dead destination cannot stall delivery to the others.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use crate::domain::ConnectionId;

/// Per-connection channel the engine pushes serialized frames into.
pub type PusherChannel = mpsc::UnboundedSender<String>;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("connection '{0}' is not registered")]
    ConnectionNotFound(String),
    #[error("failed to push message: {0}")]
    PushFailed(String),
}

/// Delivery seam between the engine and the transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// Register a connection's sender. Called once at upgrade time.
    async fn register(&self, conn_id: ConnectionId, sender: PusherChannel);

    /// Unregister a connection's sender. Called once when the transport
    /// closes.
    async fn unregister(&self, conn_id: &ConnectionId);

    /// Deliver to a single connection.
    async fn push_to(&self, conn_id: &ConnectionId, content: &str) -> Result<(), PushError>;

    /// Deliver to every target connection, isolating per-connection send
    /// failures: one dead destination never aborts delivery to the rest.
    async fn broadcast(&self, targets: Vec<ConnectionId>, content: &str)
    -> Result<(), PushError>;
}

/// [`MessagePusher`] over in-process mpsc channels, one per connection.
#[derive(Default)]
pub struct ChannelPusher {
    clients: Mutex<HashMap<ConnectionId, PusherChannel>>,
}

impl ChannelPusher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagePusher for ChannelPusher {
    async fn register(&self, conn_id: ConnectionId, sender: PusherChannel) {
        let mut clients = self.clients.lock().await;
        tracing::debug!("Connection '{}' registered to pusher", conn_id);
        clients.insert(conn_id, sender);
    }

    async fn unregister(&self, conn_id: &ConnectionId) {
        let mut clients = self.clients.lock().await;
        clients.remove(conn_id);
        tracing::debug!("Connection '{}' unregistered from pusher", conn_id);
    }

    async fn push_to(&self, conn_id: &ConnectionId, content: &str) -> Result<(), PushError> {
        let clients = self.clients.lock().await;

        if let Some(sender) = clients.get(conn_id) {
            sender
                .send(content.to_string())
                .map_err(|e| PushError::PushFailed(e.to_string()))?;
            tracing::debug!("Pushed message to connection '{}'", conn_id);
            Ok(())
        } else {
            Err(PushError::ConnectionNotFound(conn_id.as_str().to_string()))
        }
    }

    async fn broadcast(
        &self,
        targets: Vec<ConnectionId>,
        content: &str,
    ) -> Result<(), PushError> {
        let clients = self.clients.lock().await;

        for target in targets {
            if let Some(sender) = clients.get(&target) {
                // Tolerate individual send failures during fan-out
                if let Err(e) = sender.send(content.to_string()) {
                    tracing::warn!("Failed to push message to connection '{}': {}", target, e);
                } else {
                    tracing::debug!("Broadcasted message to connection '{}'", target);
                }
            } else {
                tracing::warn!("Connection '{}' not found during broadcast, skipping", target);
            }
        }

        Ok(())
    }
}
