//! Session command surface
//!
//! Every coordinator, relationship and registry operation a connected
//! player can invoke. Commands always run as the session's actor.
//!
//! ```json
//! {"type": "command", "request_id": "7",
//!  "command": {"op": "accept_invitation", "clash_id": "..."}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::auth::Actor;
use crate::model::{ClashType, RelationshipType};
use crate::store::PageRequest;
use crate::types::Result;

fn default_page_size() -> u32 {
    crate::store::page::DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    // Clashes
    CreateClash {
        name: String,
        /// Defaults to the acting player
        #[serde(default)]
        owner_id: Option<Uuid>,
        player_ids: Vec<Uuid>,
        #[serde(default = "default_clash_type")]
        clash_type: ClashType,
    },
    GetClash {
        clash_id: Uuid,
    },
    ListClashes {
        #[serde(default)]
        page: u32,
        #[serde(default = "default_page_size")]
        size: u32,
    },
    /// Clashes of a player, the acting one by default
    PlayerClashes {
        #[serde(default)]
        player_id: Option<Uuid>,
    },
    AcceptInvitation {
        clash_id: Uuid,
    },
    DeclineInvitation {
        clash_id: Uuid,
    },
    AddPlayers {
        clash_id: Uuid,
        player_ids: Vec<Uuid>,
    },
    RemovePlayers {
        clash_id: Uuid,
        player_ids: Vec<Uuid>,
    },
    DeleteClash {
        clash_id: Uuid,
    },
    DeleteAllClashes,
    Notifications,

    // Relationships
    RequestRelationship {
        target_id: Uuid,
        relationship_type: RelationshipType,
    },
    GetRelationship {
        relationship_id: Uuid,
    },
    ListRelationships {
        #[serde(default)]
        page: u32,
        #[serde(default = "default_page_size")]
        size: u32,
    },
    PlayerRelationships {
        #[serde(default)]
        player_id: Option<Uuid>,
    },
    AcceptRelationship {
        relationship_id: Uuid,
    },
    DeclineRelationship {
        relationship_id: Uuid,
    },
    DeleteRelationship {
        relationship_id: Uuid,
    },
    DeleteAllRelationships,

    // Players and presence
    GetPlayer {
        player_id: Uuid,
    },
    ListPlayers {
        #[serde(default)]
        page: u32,
        #[serde(default = "default_page_size")]
        size: u32,
    },
    RenamePlayer {
        username: String,
    },
    Presence {
        #[serde(default)]
        player_id: Option<Uuid>,
    },
}

fn default_clash_type() -> ClashType {
    ClashType::Online
}

/// Reply to `Command::Presence`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresenceReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    player_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<crate::realtime::PlayerStatus>,
    stats: crate::realtime::PresenceStats,
}

impl Command {
    /// Operation name, echoed in error bodies
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateClash { .. } => "create_clash",
            Command::GetClash { .. } => "get_clash",
            Command::ListClashes { .. } => "list_clashes",
            Command::PlayerClashes { .. } => "player_clashes",
            Command::AcceptInvitation { .. } => "accept_invitation",
            Command::DeclineInvitation { .. } => "decline_invitation",
            Command::AddPlayers { .. } => "add_players",
            Command::RemovePlayers { .. } => "remove_players",
            Command::DeleteClash { .. } => "delete_clash",
            Command::DeleteAllClashes => "delete_all_clashes",
            Command::Notifications => "notifications",
            Command::RequestRelationship { .. } => "request_relationship",
            Command::GetRelationship { .. } => "get_relationship",
            Command::ListRelationships { .. } => "list_relationships",
            Command::PlayerRelationships { .. } => "player_relationships",
            Command::AcceptRelationship { .. } => "accept_relationship",
            Command::DeclineRelationship { .. } => "decline_relationship",
            Command::DeleteRelationship { .. } => "delete_relationship",
            Command::DeleteAllRelationships => "delete_all_relationships",
            Command::GetPlayer { .. } => "get_player",
            Command::ListPlayers { .. } => "list_players",
            Command::RenamePlayer { .. } => "rename_player",
            Command::Presence { .. } => "presence",
        }
    }
}

/// Run a command as `actor` and serialize the result
pub async fn execute(state: &AppState, actor: &Actor, command: Command) -> Result<Value> {
    let me = actor.player_id;
    let value = match command {
        Command::CreateClash {
            name,
            owner_id,
            player_ids,
            clash_type,
        } => {
            let owner_id = owner_id.unwrap_or(me);
            serde_json::to_value(
                state
                    .clashes
                    .create(&name, owner_id, &player_ids, clash_type, actor)
                    .await?,
            )?
        }
        Command::GetClash { clash_id } => {
            serde_json::to_value(state.clashes.get_by_id(clash_id).await?)?
        }
        Command::ListClashes { page, size } => {
            serde_json::to_value(state.clashes.list(PageRequest::new(page, size)).await?)?
        }
        Command::PlayerClashes { player_id } => serde_json::to_value(
            state
                .clashes
                .list_for_player(player_id.unwrap_or(me))
                .await?,
        )?,
        Command::AcceptInvitation { clash_id } => serde_json::to_value(
            state.clashes.accept_invitation(clash_id, me, actor).await?,
        )?,
        Command::DeclineInvitation { clash_id } => serde_json::to_value(
            state.clashes.decline_invitation(clash_id, me, actor).await?,
        )?,
        Command::AddPlayers {
            clash_id,
            player_ids,
        } => serde_json::to_value(
            state
                .clashes
                .add_players(clash_id, &player_ids, actor)
                .await?,
        )?,
        Command::RemovePlayers {
            clash_id,
            player_ids,
        } => serde_json::to_value(
            state
                .clashes
                .remove_players(clash_id, &player_ids, actor)
                .await?,
        )?,
        Command::DeleteClash { clash_id } => {
            state.clashes.delete(clash_id, actor).await?;
            Value::Null
        }
        Command::DeleteAllClashes => {
            serde_json::json!({ "deleted": state.clashes.delete_all(actor).await? })
        }
        Command::Notifications => {
            serde_json::to_value(state.clashes.list_notifications(me, actor).await?)?
        }
        Command::RequestRelationship {
            target_id,
            relationship_type,
        } => serde_json::to_value(
            state
                .relationships
                .request(me, target_id, relationship_type, actor)
                .await?,
        )?,
        Command::GetRelationship { relationship_id } => {
            serde_json::to_value(state.relationships.get_by_id(relationship_id).await?)?
        }
        Command::ListRelationships { page, size } => serde_json::to_value(
            state
                .relationships
                .list(PageRequest::new(page, size))
                .await?,
        )?,
        Command::PlayerRelationships { player_id } => serde_json::to_value(
            state
                .relationships
                .list_for_player(player_id.unwrap_or(me))
                .await?,
        )?,
        Command::AcceptRelationship { relationship_id } => serde_json::to_value(
            state
                .relationships
                .accept_by_id(relationship_id, actor)
                .await?,
        )?,
        Command::DeclineRelationship { relationship_id } => {
            state
                .relationships
                .decline_by_id(relationship_id, actor)
                .await?;
            Value::Null
        }
        Command::DeleteRelationship { relationship_id } => {
            state
                .relationships
                .delete_by_id(relationship_id, actor)
                .await?;
            Value::Null
        }
        Command::DeleteAllRelationships => {
            serde_json::json!({ "deleted": state.relationships.delete_all(actor).await? })
        }
        Command::GetPlayer { player_id } => {
            serde_json::to_value(state.players.get(player_id).await?)?
        }
        Command::ListPlayers { page, size } => {
            serde_json::to_value(state.players.list(PageRequest::new(page, size)).await?)?
        }
        Command::RenamePlayer { username } => {
            serde_json::to_value(state.players.rename(me, &username, actor).await?)?
        }
        Command::Presence { player_id } => serde_json::to_value(PresenceReply {
            player_id,
            status: player_id.map(|id| state.presence.status(id)),
            stats: state.presence.stats(),
        })?,
    };
    Ok(value)
}
