//! Services layer
//!
//! Business logic that coordinates the stores and the real-time channel.
//!
//! ## Services
//!
//! - **ClashCoordinator**: clash lifecycle, de-duplication, roster edits
//! - **RelationshipGate**: friend/block edge state machine
//! - **NotificationGenerator**: invitation notices for a roster
//! - **GameLifecycle**: game creation collaborator
//! - **PlayerRegistry**: registration, rename and lookup
//! - **KeyedLocks**: per-key serialization of read-modify-write sequences

pub mod clash;
pub mod game;
pub mod locks;
pub mod notification;
pub mod player;
pub mod relationship;

pub use clash::{ClashCoordinator, ClashCoordinatorConfig, DEFAULT_OFFLINE_CLASH_LIMIT};
pub use game::{GameLifecycle, StoredGames};
pub use locks::KeyedLocks;
pub use notification::{clash_invitations, clash_link, NotificationGenerator};
pub use player::PlayerRegistry;
pub use relationship::RelationshipGate;
