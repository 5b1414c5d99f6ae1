//! Persistence boundary
//!
//! Each record type has a store trait so the services never see the backend.
//! The in-memory stores are the default; `MongoClashStore` persists clashes
//! in MongoDB and enforces active-clash uniqueness with an index.
//!
//! The clash and relationship stores own the uniqueness constraints: an
//! insert or update that would produce a second active clash for the same
//! (participant hash, type), or a second edge for the same pair of players,
//! fails with `Conflict` atomically.

pub mod memory;
pub mod mongo;
pub mod page;

pub use memory::{
    MemoryClashStore, MemoryGameStore, MemoryNotificationStore, MemoryPlayerStore,
    MemoryRelationshipStore,
};
pub use mongo::MongoClashStore;
pub use page::{Page, PageRequest};

use uuid::Uuid;

use crate::model::{
    Clash, ClashStatus, ClashType, Game, Notification, Player, PlayerRelationship,
};
use crate::types::{ClashError, Result};

/// Error for a second active clash over the same participant set
pub fn duplicate_clash() -> ClashError {
    ClashError::Conflict("A clash with those players already exists".into())
}

#[async_trait::async_trait]
pub trait ClashStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Clash>>;

    /// All clashes the player is part of, most recently updated first
    async fn find_all_by_player(&self, player_id: Uuid) -> Result<Vec<Clash>>;

    /// Active clash for a participant set, if any
    async fn find_active(
        &self,
        participant_hash: &str,
        clash_type: ClashType,
    ) -> Result<Option<Clash>>;

    async fn count_by_player_status_type(
        &self,
        player_id: Uuid,
        status: ClashStatus,
        clash_type: ClashType,
    ) -> Result<u64>;

    /// Insert a new clash; `Conflict` if an active clash already holds the
    /// same (participant hash, type)
    async fn insert(&self, clash: &Clash) -> Result<()>;

    /// Replace a stored clash; same uniqueness rule as `insert`
    async fn update(&self, clash: &Clash) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn delete_all(&self) -> Result<u64>;

    async fn list(&self, page: PageRequest) -> Result<Page<Clash>>;
}

#[async_trait::async_trait]
pub trait PlayerStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Player>>;

    async fn find_all_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Player>>;

    async fn exists_by_username(&self, username: &str) -> Result<bool>;

    async fn save(&self, player: &Player) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list(&self, page: PageRequest) -> Result<Page<Player>>;
}

#[async_trait::async_trait]
pub trait GameStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Game>>;

    async fn find_all_by_owner(&self, owner_id: Uuid) -> Result<Vec<Game>>;

    async fn save(&self, game: &Game) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list(&self, page: PageRequest) -> Result<Page<Game>>;
}

#[async_trait::async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PlayerRelationship>>;

    /// The edge between two players, in either direction
    async fn find_between(&self, a: Uuid, b: Uuid) -> Result<Option<PlayerRelationship>>;

    async fn find_all_by_player(&self, player_id: Uuid) -> Result<Vec<PlayerRelationship>>;

    /// Insert a new edge; `Conflict` if the pair already has one
    async fn insert(&self, relationship: &PlayerRelationship) -> Result<()>;

    async fn update(&self, relationship: &PlayerRelationship) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn delete_all(&self) -> Result<u64>;

    async fn list(&self, page: PageRequest) -> Result<Page<PlayerRelationship>>;
}

#[async_trait::async_trait]
pub trait NotificationStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Newest first
    async fn find_all_by_recipient(&self, recipient_id: Uuid) -> Result<Vec<Notification>>;

    async fn save_all(&self, notifications: &[Notification]) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list(&self, page: PageRequest) -> Result<Page<Notification>>;
}
