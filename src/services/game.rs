//! Game lifecycle collaborator
//!
//! The clash coordinator creates games, and discards one again when the
//! clash change it was created for cannot be committed. Everything else
//! belongs to the game engine.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Game, GameType};
use crate::store::GameStore;
use crate::types::Result;

#[async_trait::async_trait]
pub trait GameLifecycle: Send + Sync {
    /// Create and persist a game owned by `owner_id`
    async fn create(&self, owner_id: Uuid, game_type: GameType) -> Result<Game>;

    /// Drop a game that never became part of a clash
    async fn discard(&self, game_id: Uuid) -> Result<()>;
}

/// Lifecycle that just records the game in a `GameStore`
pub struct StoredGames {
    store: Arc<dyn GameStore>,
}

impl StoredGames {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl GameLifecycle for StoredGames {
    async fn create(&self, owner_id: Uuid, game_type: GameType) -> Result<Game> {
        let game = Game::new(owner_id, game_type);
        self.store.save(&game).await?;
        debug!(game_id = %game.id, owner_id = %owner_id, "Created game");
        Ok(game)
    }

    async fn discard(&self, game_id: Uuid) -> Result<()> {
        if self.store.delete(game_id).await? {
            debug!(game_id = %game_id, "Discarded game");
        }
        Ok(())
    }
}
