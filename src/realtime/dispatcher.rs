//! Event dispatcher
//!
//! Stamps and routes envelopes onto the transport. Delivery is best effort:
//! failures are logged and never returned to the operation that triggered
//! them.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::envelope::{Envelope, MessageType};
use super::transport::{private_destination, Transport, TransportError, PUBLIC_TOPIC};
use crate::types::{ClashError, Result};

#[derive(Clone)]
pub struct EventDispatcher {
    transport: Arc<dyn Transport>,
}

impl EventDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Broadcast to every subscriber of the public destination
    pub fn public_message(&self, envelope: Envelope, sender_id: Uuid) -> usize {
        self.deliver(PUBLIC_TOPIC, envelope.with_sender(sender_id))
    }

    /// Deliver to the receiver's private destination only
    pub fn private_message(&self, envelope: Envelope, sender_id: Uuid) -> Result<usize> {
        let receiver = envelope.receiver_id.ok_or_else(|| {
            ClashError::InvalidArgument("Private message requires a receiver".into())
        })?;
        Ok(self.deliver(
            &private_destination(receiver),
            envelope.with_sender(sender_id),
        ))
    }

    /// Serialize `content` into a fresh envelope and deliver it.
    ///
    /// Missing content or a serialization failure produces an empty payload.
    pub fn convert_and_send<T>(
        &self,
        destination: &str,
        content: Option<&T>,
        message_type: MessageType,
    ) -> usize
    where
        T: Serialize + ?Sized,
    {
        let envelope = Envelope::new(generate_payload(content), message_type);
        self.deliver(destination, envelope)
    }

    /// `convert_and_send` to a player's private destination
    pub fn send_to_player<T>(
        &self,
        player_id: Uuid,
        content: &T,
        message_type: MessageType,
    ) -> usize
    where
        T: Serialize + ?Sized,
    {
        self.convert_and_send(&private_destination(player_id), Some(content), message_type)
    }

    fn deliver(&self, destination: &str, envelope: Envelope) -> usize {
        let message_type = envelope.message_type;
        match self.transport.send(destination, envelope) {
            Ok(count) => {
                debug!(destination, %message_type, count, "Delivered envelope");
                count
            }
            Err(TransportError::NoSubscribers(_)) => {
                debug!(destination, %message_type, "No subscribers, envelope dropped");
                0
            }
            Err(e) => {
                warn!(destination, %message_type, "Delivery failed: {}", e);
                0
            }
        }
    }
}

fn generate_payload<T>(content: Option<&T>) -> Vec<u8>
where
    T: Serialize + ?Sized,
{
    let Some(content) = content else {
        warn!("Content is empty, sending envelope without payload");
        return Vec::new();
    };
    match serde_json::to_vec(content) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to serialize envelope payload: {}", e);
            Vec::new()
        }
    }
}
