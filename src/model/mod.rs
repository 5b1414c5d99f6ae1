//! Domain records
//!
//! - **Player**: identity, kind tag and capabilities
//! - **Clash**: match invitation aggregate with its roster
//! - **Game**: play session started by a clash participant
//! - **PlayerRelationship**: FRIEND/BLOCK edge between two players
//! - **Notification**: message addressed to one player

pub mod clash;
pub mod game;
pub mod notification;
pub mod player;
pub mod relationship;

pub use clash::{
    participant_hash, validate_roster, Clash, ClashPlayer, ClashStatus, ClashType,
    InvitationState, MAX_PLAYERS, MIN_PLAYERS,
};
pub use game::{Game, GameType};
pub use notification::{Notification, NotificationType};
pub use player::{is_valid_username, Player, PlayerKind, MAX_USERNAME_LEN, MIN_USERNAME_LEN};
pub use relationship::{PairKey, PlayerRelationship, RelationshipType};
