//! Clashdoor - clash coordination gateway
//!
//! Coordinates ad hoc matches ("clashes") among 2-4 players: invitations,
//! accept/decline, roster edits, start conditions and real-time fan-out of
//! every change to connected players, gated by a friend/block graph.
//!
//! ## Components
//!
//! - **ClashCoordinator**: clash lifecycle with de-duplication by participant set
//! - **RelationshipGate**: friend/block edge state machine
//! - **NotificationGenerator**: invitation notices for a roster
//! - **EventDispatcher**: public and private delivery of event envelopes
//! - **PresenceDirectory**: online status and subscription bookkeeping
//! - **Server**: WebSocket sessions exposing all of the above

pub mod auth;
pub mod config;
pub mod model;
pub mod realtime;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ClashError, Result};
