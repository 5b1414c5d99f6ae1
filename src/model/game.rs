//! Game record
//!
//! Created whenever a clash participant begins active play. This crate never
//! mutates a game after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameType {
    Training,
    Clash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(rename = "type")]
    pub game_type: GameType,
    pub created_at: DateTime<Utc>,
}

impl Game {
    pub fn new(owner_id: Uuid, game_type: GameType) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            game_type,
            created_at: Utc::now(),
        }
    }
}
