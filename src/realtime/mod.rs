//! Real-time delivery
//!
//! - **PresenceDirectory**: online status and subscription bookkeeping
//! - **Envelope**: addressed, typed, opaque payload with headers
//! - **Transport**: destination-based delivery, in-process via broadcast channels
//! - **EventDispatcher**: public/private/convert-and-send entry points

pub mod dispatcher;
pub mod envelope;
pub mod presence;
pub mod transport;

pub use dispatcher::EventDispatcher;
pub use envelope::{Envelope, MessageType, WireEnvelope};
pub use presence::{PlayerStatus, PresenceDirectory, PresenceStats};
pub use transport::{
    private_destination, ChannelTransport, Transport, TransportError, DEFAULT_CHANNEL_CAPACITY,
    PUBLIC_TOPIC,
};
