//! Event envelopes
//!
//! The unit delivered over the real-time channel. The payload is opaque
//! bytes; the header map mirrors the addressing fields so transports can
//! route without decoding the payload.

use base64::prelude::*;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub const HEADER_SENDER_ID: &str = "senderId";
pub const HEADER_RECEIVER_ID: &str = "receiverId";
pub const HEADER_MESSAGE_TYPE: &str = "messageType";
pub const HEADER_TIMESTAMP: &str = "timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Chat,
    ClashUpdated,
    ClashDeleted,
    Notification,
    Status,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Chat => "CHAT",
            MessageType::ClashUpdated => "CLASH_UPDATED",
            MessageType::ClashDeleted => "CLASH_DELETED",
            MessageType::Notification => "NOTIFICATION",
            MessageType::Status => "STATUS",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub payload: Bytes,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub headers: BTreeMap<String, String>,
}

impl Envelope {
    /// Unaddressed envelope
    pub fn new(payload: impl Into<Bytes>, message_type: MessageType) -> Self {
        Self::addressed(None, None, payload, message_type)
    }

    pub fn addressed(
        sender_id: Option<Uuid>,
        receiver_id: Option<Uuid>,
        payload: impl Into<Bytes>,
        message_type: MessageType,
    ) -> Self {
        let mut envelope = Self {
            sender_id,
            receiver_id,
            payload: payload.into(),
            message_type,
            timestamp: Utc::now(),
            headers: BTreeMap::new(),
        };
        envelope.refresh_headers();
        envelope
    }

    /// Stamp the sender and rebuild the headers
    pub fn with_sender(mut self, sender_id: Uuid) -> Self {
        self.sender_id = Some(sender_id);
        self.refresh_headers();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn refresh_headers(&mut self) {
        self.headers.clear();
        if let Some(sender) = self.sender_id {
            self.headers
                .insert(HEADER_SENDER_ID.to_string(), sender.to_string());
        }
        if let Some(receiver) = self.receiver_id {
            self.headers
                .insert(HEADER_RECEIVER_ID.to_string(), receiver.to_string());
        }
        self.headers.insert(
            HEADER_MESSAGE_TYPE.to_string(),
            self.message_type.as_str().to_string(),
        );
        self.headers
            .insert(HEADER_TIMESTAMP.to_string(), self.timestamp.to_rfc3339());
    }
}

/// JSON frame sent to WebSocket clients; the payload travels as base64
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Uuid>,
    pub payload: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub headers: BTreeMap<String, String>,
}

impl From<&Envelope> for WireEnvelope {
    fn from(envelope: &Envelope) -> Self {
        Self {
            sender_id: envelope.sender_id,
            receiver_id: envelope.receiver_id,
            payload: BASE64_STANDARD.encode(&envelope.payload),
            message_type: envelope.message_type,
            timestamp: envelope.timestamp,
            headers: envelope.headers.clone(),
        }
    }
}

impl WireEnvelope {
    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.payload)
    }
}
