//! Delivery transport
//!
//! A transport takes an envelope addressed to a destination and hands it to
//! every current subscriber of that destination. `ChannelTransport` is the
//! in-process implementation: one tokio broadcast channel per destination,
//! created lazily on first subscribe.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::envelope::Envelope;

/// Shared broadcast destination every player may subscribe to
pub const PUBLIC_TOPIC: &str = "/topic/public";

/// Default buffered envelopes per destination
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Private destination of a player
pub fn private_destination(player_id: Uuid) -> String {
    format!("/player/{}/private", player_id)
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No subscribers for {0}")]
    NoSubscribers(String),

    #[error("Transport closed: {0}")]
    Closed(String),
}

pub trait Transport: Send + Sync {
    /// Deliver `envelope` to `destination`, returning how many subscribers
    /// received it
    fn send(&self, destination: &str, envelope: Envelope) -> Result<usize, TransportError>;
}

pub struct ChannelTransport {
    topics: DashMap<String, broadcast::Sender<Envelope>>,
    capacity: usize,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a destination, creating it if needed
    pub fn subscribe(&self, destination: &str) -> broadcast::Receiver<Envelope> {
        self.topics
            .entry(destination.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.topics
            .get(destination)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop destinations nobody listens to any more
    pub fn prune(&self) -> usize {
        let before = self.topics.len();
        self.topics.retain(|_, tx| tx.receiver_count() > 0);
        let removed = before - self.topics.len();
        if removed > 0 {
            debug!(removed, "Pruned idle destinations");
        }
        removed
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, destination: &str, envelope: Envelope) -> Result<usize, TransportError> {
        let tx = self
            .topics
            .get(destination)
            .map(|tx| tx.clone())
            .ok_or_else(|| TransportError::NoSubscribers(destination.to_string()))?;
        tx.send(envelope)
            .map_err(|_| TransportError::NoSubscribers(destination.to_string()))
    }
}
