//! Player registry
//!
//! Thin identity surface over the player store: registration with unique
//! usernames, rename and lookup. Credentials live elsewhere.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::auth::{check_permission, Actor};
use crate::model::{is_valid_username, Player, MAX_USERNAME_LEN, MIN_USERNAME_LEN};
use crate::store::{Page, PageRequest, PlayerStore};
use crate::types::{ClashError, Result};

pub struct PlayerRegistry {
    players: Arc<dyn PlayerStore>,
    /// Serializes the username check with the write
    names: Mutex<()>,
}

impl PlayerRegistry {
    pub fn new(players: Arc<dyn PlayerStore>) -> Self {
        Self {
            players,
            names: Mutex::new(()),
        }
    }

    pub fn store(&self) -> Arc<dyn PlayerStore> {
        Arc::clone(&self.players)
    }

    pub async fn register_anonymous(&self, username: &str) -> Result<Player> {
        self.register_player(Player::anonymous(username)).await
    }

    pub async fn register(&self, username: &str, email: Option<String>) -> Result<Player> {
        self.register_player(Player::registered(username, email)).await
    }

    /// Return the player, registering an anonymous one under `player_id` if
    /// it is unknown
    pub async fn get_or_register(&self, player_id: Uuid) -> Result<Player> {
        if let Some(player) = self.players.find_by_id(player_id).await? {
            return Ok(player);
        }
        let simple = player_id.simple().to_string();
        let username = format!("guest-{}", &simple[..8]);
        self.register_player(Player::anonymous(username).with_id(player_id))
            .await
    }

    pub async fn rename(&self, player_id: Uuid, username: &str, actor: &Actor) -> Result<Player> {
        check_permission(Some(actor), player_id)?;
        validate_username(username)?;

        let _names = self.names.lock().await;
        let mut player = self.get(player_id).await?;
        if player.username == username {
            return Ok(player);
        }
        if self.players.exists_by_username(username).await? {
            return Err(username_taken(username));
        }
        player.username = username.to_string();
        player.updated_at = chrono::Utc::now();
        self.players.save(&player).await?;
        info!(player_id = %player_id, username = %username, "Player renamed");
        Ok(player)
    }

    pub async fn get(&self, player_id: Uuid) -> Result<Player> {
        self.players
            .find_by_id(player_id)
            .await?
            .ok_or_else(|| ClashError::NotFound(format!("Player {}", player_id)))
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<Player>> {
        self.players.list(page).await
    }

    async fn register_player(&self, player: Player) -> Result<Player> {
        validate_username(&player.username)?;

        let _names = self.names.lock().await;
        if self.players.find_by_id(player.id).await?.is_some() {
            return Err(ClashError::Conflict(format!("Player {} already exists", player.id)));
        }
        if self.players.exists_by_username(&player.username).await? {
            return Err(username_taken(&player.username));
        }
        self.players.save(&player).await?;
        info!(
            player_id = %player.id,
            username = %player.username,
            anonymous = player.is_anonymous(),
            "Player registered"
        );
        Ok(player)
    }
}

fn validate_username(username: &str) -> Result<()> {
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(ClashError::InvalidArgument(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )))
    }
}

fn username_taken(username: &str) -> ClashError {
    ClashError::Conflict(format!("Username {} is already taken", username))
}
