//! Relationship gate
//!
//! Friend/block edge state machine. At most one edge exists per unordered
//! pair of players; the store enforces that, and requests on the same pair
//! are serialized here so the read-decide-write sequence cannot interleave.
//!
//! | existing edge                         | requested | outcome                        |
//! |---------------------------------------|-----------|--------------------------------|
//! | none                                  | FRIEND    | new inactive edge              |
//! | none                                  | BLOCK     | new active edge                |
//! | inactive FRIEND from the other player | FRIEND    | activate it                    |
//! | FRIEND                                | BLOCK     | replace with active BLOCK edge |
//! | active FRIEND                         | FRIEND    | Conflict                       |
//! | inactive FRIEND from the requester    | FRIEND    | Conflict                       |
//! | BLOCK, either direction               | any       | Conflict                       |

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::locks::KeyedLocks;
use crate::auth::{check_permission, require_admin, Actor};
use crate::model::{PairKey, PlayerRelationship, RelationshipType};
use crate::store::{Page, PageRequest, PlayerStore, RelationshipStore};
use crate::types::{ClashError, Result};

pub struct RelationshipGate {
    relationships: Arc<dyn RelationshipStore>,
    players: Arc<dyn PlayerStore>,
    locks: KeyedLocks<PairKey>,
}

impl RelationshipGate {
    pub fn new(relationships: Arc<dyn RelationshipStore>, players: Arc<dyn PlayerStore>) -> Self {
        Self {
            relationships,
            players,
            locks: KeyedLocks::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_by_id(&self, id: Uuid) -> Result<PlayerRelationship> {
        self.relationships
            .find_by_id(id)
            .await?
            .ok_or_else(|| ClashError::NotFound(format!("Relationship {}", id)))
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<PlayerRelationship>> {
        self.relationships.list(page).await
    }

    pub async fn list_for_player(&self, player_id: Uuid) -> Result<Vec<PlayerRelationship>> {
        self.relationships.find_all_by_player(player_id).await
    }

    /// Fail if either player has blocked the other
    pub async fn ensure_can_invite(&self, inviter_id: Uuid, invitee_id: Uuid) -> Result<()> {
        if inviter_id == invitee_id {
            return Ok(());
        }
        match self.relationships.find_between(inviter_id, invitee_id).await? {
            Some(edge) if edge.is_block() => Err(ClashError::PermissionDenied(format!(
                "Player {} cannot be invited",
                invitee_id
            ))),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Request a FRIEND or BLOCK edge from `requester_id` to `target_id`
    pub async fn request(
        &self,
        requester_id: Uuid,
        target_id: Uuid,
        relationship_type: RelationshipType,
        actor: &Actor,
    ) -> Result<PlayerRelationship> {
        check_permission(Some(actor), requester_id).map_err(|_| {
            ClashError::PermissionDenied("Cannot request relationship for others".into())
        })?;
        if target_id.is_nil() {
            return Err(ClashError::InvalidArgument("Invalid Player Id".into()));
        }
        if requester_id == target_id {
            return Err(ClashError::InvalidArgument("Invalid Relationship".into()));
        }
        self.require_player(requester_id).await?;
        self.require_player(target_id).await?;

        let _guard = self.locks.lock(PairKey::new(requester_id, target_id)).await;
        let existing = self.relationships.find_between(requester_id, target_id).await?;

        match existing {
            None => {
                let edge = PlayerRelationship::new(requester_id, target_id, relationship_type);
                self.relationships.insert(&edge).await?;
                info!(
                    relationship_id = %edge.id,
                    requester_id = %requester_id,
                    target_id = %target_id,
                    kind = relationship_type.as_str(),
                    "Relationship requested"
                );
                Ok(edge)
            }
            Some(edge) if edge.is_block() => {
                Err(ClashError::Conflict("Invalid Relationship".into()))
            }
            Some(edge) if relationship_type == RelationshipType::Block => {
                self.relationships.delete(edge.id).await?;
                let block =
                    PlayerRelationship::new(requester_id, target_id, RelationshipType::Block);
                self.relationships.insert(&block).await?;
                info!(
                    relationship_id = %block.id,
                    replaced = %edge.id,
                    requester_id = %requester_id,
                    target_id = %target_id,
                    "Player blocked"
                );
                Ok(block)
            }
            Some(edge) if edge.active => {
                Err(ClashError::Conflict("Relationship is already active".into()))
            }
            Some(edge) if edge.requester_id == requester_id => {
                Err(ClashError::Conflict("Relationship already requested".into()))
            }
            Some(mut edge) => {
                edge.activate();
                self.relationships.update(&edge).await?;
                info!(relationship_id = %edge.id, "Friendship accepted by mutual request");
                Ok(edge)
            }
        }
    }

    /// The target of a pending FRIEND request accepts it
    pub async fn accept_by_id(&self, id: Uuid, actor: &Actor) -> Result<PlayerRelationship> {
        let edge = self.get_by_id(id).await?;
        let _guard = self.locks.lock(edge.pair()).await;

        let mut edge = self.get_by_id(id).await?;
        ensure_pending_target(&edge, actor, "accept")?;
        edge.activate();
        self.relationships.update(&edge).await?;
        info!(relationship_id = %id, "Relationship accepted");
        Ok(edge)
    }

    /// The target of a pending FRIEND request turns it down; the edge is removed
    pub async fn decline_by_id(&self, id: Uuid, actor: &Actor) -> Result<()> {
        let edge = self.get_by_id(id).await?;
        let _guard = self.locks.lock(edge.pair()).await;

        let edge = self.get_by_id(id).await?;
        ensure_pending_target(&edge, actor, "decline")?;
        self.relationships.delete(id).await?;
        info!(relationship_id = %id, "Relationship declined");
        Ok(())
    }

    /// FRIEND edges cannot be deleted by either of their players. BLOCK edges
    /// can only be deleted by the player who blocked.
    pub async fn delete_by_id(&self, id: Uuid, actor: &Actor) -> Result<()> {
        let edge = self.get_by_id(id).await?;
        let _guard = self.locks.lock(edge.pair()).await;

        let edge = self.get_by_id(id).await?;
        let allowed = match edge.relationship_type {
            RelationshipType::Friend => !edge.involves(actor.player_id),
            RelationshipType::Block => edge.requester_id == actor.player_id,
        };
        if !allowed {
            return Err(ClashError::PermissionDenied("Cannot delete".into()));
        }
        self.relationships.delete(id).await?;
        info!(relationship_id = %id, "Relationship deleted");
        Ok(())
    }

    /// Admin only
    pub async fn delete_all(&self, actor: &Actor) -> Result<u64> {
        require_admin(actor)?;
        let removed = self.relationships.delete_all().await?;
        info!(removed, "Deleted all relationships");
        Ok(removed)
    }

    /// Forget per-pair locks nobody holds
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }

    async fn require_player(&self, player_id: Uuid) -> Result<()> {
        match self.players.find_by_id(player_id).await? {
            Some(_) => Ok(()),
            None => {
                debug!(player_id = %player_id, "Relationship with unknown player");
                Err(ClashError::NotFound(format!("Player {}", player_id)))
            }
        }
    }
}

fn ensure_pending_target(edge: &PlayerRelationship, actor: &Actor, action: &str) -> Result<()> {
    if edge.target_id != actor.player_id {
        return Err(ClashError::PermissionDenied(format!(
            "Cannot {} relationship for others",
            action
        )));
    }
    if edge.is_block() {
        return Err(ClashError::IllegalState("Invalid Request".into()));
    }
    if edge.active {
        return Err(ClashError::IllegalState("Relationship is already active".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Player;
    use crate::store::{MemoryPlayerStore, MemoryRelationshipStore};

    struct Fixture {
        gate: RelationshipGate,
        a: Uuid,
        b: Uuid,
    }

    async fn fixture() -> Fixture {
        let players = Arc::new(MemoryPlayerStore::new());
        let a = Player::anonymous("alice");
        let b = Player::anonymous("bob");
        players.save(&a).await.unwrap();
        players.save(&b).await.unwrap();
        Fixture {
            gate: RelationshipGate::new(Arc::new(MemoryRelationshipStore::new()), players),
            a: a.id,
            b: b.id,
        }
    }

    #[tokio::test]
    async fn test_mutual_friend_requests_activate_edge() {
        let f = fixture().await;
        let first = f
            .gate
            .request(f.a, f.b, RelationshipType::Friend, &Actor::user(f.a))
            .await
            .unwrap();
        assert!(!first.active);

        let second = f
            .gate
            .request(f.b, f.a, RelationshipType::Friend, &Actor::user(f.b))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert!(second.active);
        assert_eq!(f.gate.list_for_player(f.a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeat_requests_conflict() {
        let f = fixture().await;
        let actor = Actor::user(f.a);
        f.gate.request(f.a, f.b, RelationshipType::Friend, &actor).await.unwrap();

        let again = f.gate.request(f.a, f.b, RelationshipType::Friend, &actor).await;
        assert!(matches!(again, Err(ClashError::Conflict(m)) if m.contains("requested")));

        f.gate
            .request(f.b, f.a, RelationshipType::Friend, &Actor::user(f.b))
            .await
            .unwrap();
        let active = f.gate.request(f.a, f.b, RelationshipType::Friend, &actor).await;
        assert!(matches!(active, Err(ClashError::Conflict(m)) if m.contains("active")));
    }

    #[tokio::test]
    async fn test_block_replaces_friend_edge() {
        let f = fixture().await;
        let friend = f
            .gate
            .request(f.a, f.b, RelationshipType::Friend, &Actor::user(f.a))
            .await
            .unwrap();

        let block = f
            .gate
            .request(f.b, f.a, RelationshipType::Block, &Actor::user(f.b))
            .await
            .unwrap();
        assert!(block.active);
        assert_eq!(block.requester_id, f.b);
        assert!(matches!(
            f.gate.get_by_id(friend.id).await,
            Err(ClashError::NotFound(_))
        ));

        let blocked = f
            .gate
            .request(f.a, f.b, RelationshipType::Friend, &Actor::user(f.a))
            .await;
        assert!(matches!(blocked, Err(ClashError::Conflict(_))));
        assert!(f.gate.ensure_can_invite(f.a, f.b).await.is_err());
    }

    #[tokio::test]
    async fn test_request_validation() {
        let f = fixture().await;
        let own = f
            .gate
            .request(f.a, f.a, RelationshipType::Friend, &Actor::user(f.a))
            .await;
        assert!(matches!(own, Err(ClashError::InvalidArgument(_))));

        let proxy = f
            .gate
            .request(f.a, f.b, RelationshipType::Friend, &Actor::user(f.b))
            .await;
        assert!(matches!(proxy, Err(ClashError::PermissionDenied(_))));

        let unknown = f
            .gate
            .request(f.a, Uuid::new_v4(), RelationshipType::Friend, &Actor::user(f.a))
            .await;
        assert!(matches!(unknown, Err(ClashError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_accept_and_decline_by_target_only() {
        let f = fixture().await;
        let edge = f
            .gate
            .request(f.a, f.b, RelationshipType::Friend, &Actor::user(f.a))
            .await
            .unwrap();

        assert!(matches!(
            f.gate.accept_by_id(edge.id, &Actor::user(f.a)).await,
            Err(ClashError::PermissionDenied(_))
        ));
        let accepted = f.gate.accept_by_id(edge.id, &Actor::user(f.b)).await.unwrap();
        assert!(accepted.active);
        assert!(matches!(
            f.gate.decline_by_id(edge.id, &Actor::user(f.b)).await,
            Err(ClashError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn test_decline_removes_edge() {
        let f = fixture().await;
        let edge = f
            .gate
            .request(f.a, f.b, RelationshipType::Friend, &Actor::user(f.a))
            .await
            .unwrap();
        f.gate.decline_by_id(edge.id, &Actor::user(f.b)).await.unwrap();
        assert!(f.gate.list_for_player(f.b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let f = fixture().await;
        let friend = f
            .gate
            .request(f.a, f.b, RelationshipType::Friend, &Actor::user(f.a))
            .await
            .unwrap();
        for player in [f.a, f.b] {
            assert!(matches!(
                f.gate.delete_by_id(friend.id, &Actor::user(player)).await,
                Err(ClashError::PermissionDenied(_))
            ));
        }

        let block = f
            .gate
            .request(f.a, f.b, RelationshipType::Block, &Actor::user(f.a))
            .await
            .unwrap();
        assert!(f.gate.delete_by_id(block.id, &Actor::user(f.b)).await.is_err());
        f.gate.delete_by_id(block.id, &Actor::user(f.a)).await.unwrap();
        assert!(f.gate.ensure_can_invite(f.a, f.b).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_all_requires_admin() {
        let f = fixture().await;
        f.gate
            .request(f.a, f.b, RelationshipType::Block, &Actor::user(f.a))
            .await
            .unwrap();
        assert!(f.gate.delete_all(&Actor::user(f.a)).await.is_err());
        assert_eq!(f.gate.delete_all(&Actor::admin(f.a)).await.unwrap(), 1);
    }
}
