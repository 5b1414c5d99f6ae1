//! Clash coordinator
//!
//! Owns the clash lifecycle: creation with de-duplication by participant
//! set, invitation responses, roster edits and deletion. Every successful
//! mutation is persisted first and then announced to the roster over the
//! dispatcher; delivery problems never undo a committed change.
//!
//! Mutations of one clash are serialized with a per-clash lock. Creation is
//! guarded by the store, which rejects a second active clash for the same
//! (participant hash, type) atomically.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::game::GameLifecycle;
use super::locks::KeyedLocks;
use super::notification::NotificationGenerator;
use super::relationship::RelationshipGate;
use crate::auth::{check_permission, require_admin, Actor};
use crate::model::{
    validate_roster, Clash, ClashStatus, ClashType, GameType, Notification,
};
use crate::realtime::{EventDispatcher, MessageType};
use crate::store::{duplicate_clash, ClashStore, NotificationStore, Page, PageRequest};
use crate::types::{ClashError, Result};

/// Default number of IN_PROGRESS OFFLINE clashes a player may exceed before
/// creating more is refused
pub const DEFAULT_OFFLINE_CLASH_LIMIT: u64 = 5;

#[derive(Debug, Clone)]
pub struct ClashCoordinatorConfig {
    /// Creation of an OFFLINE clash fails once the actor has more than this
    /// many IN_PROGRESS OFFLINE clashes
    pub offline_clash_limit: u64,
}

impl Default for ClashCoordinatorConfig {
    fn default() -> Self {
        Self {
            offline_clash_limit: DEFAULT_OFFLINE_CLASH_LIMIT,
        }
    }
}

pub struct ClashCoordinator {
    config: ClashCoordinatorConfig,
    clashes: Arc<dyn ClashStore>,
    notifications: Arc<dyn NotificationStore>,
    games: Arc<dyn GameLifecycle>,
    generator: NotificationGenerator,
    dispatcher: EventDispatcher,
    /// Optional block check for invitations
    relationships: Option<Arc<RelationshipGate>>,
    locks: KeyedLocks<Uuid>,
}

impl ClashCoordinator {
    pub fn new(
        config: ClashCoordinatorConfig,
        clashes: Arc<dyn ClashStore>,
        notifications: Arc<dyn NotificationStore>,
        games: Arc<dyn GameLifecycle>,
        generator: NotificationGenerator,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            config,
            clashes,
            notifications,
            games,
            generator,
            dispatcher,
            relationships: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Refuse invitations between players where either blocked the other
    pub fn with_relationship_gate(mut self, gate: Arc<RelationshipGate>) -> Self {
        self.relationships = Some(gate);
        self
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_by_id(&self, clash_id: Uuid) -> Result<Clash> {
        self.clashes
            .find_by_id(clash_id)
            .await?
            .ok_or_else(|| ClashError::NotFound(format!("Clash {}", clash_id)))
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<Clash>> {
        self.clashes.list(page).await
    }

    /// Clashes the player is part of, most recently updated first
    pub async fn list_for_player(&self, player_id: Uuid) -> Result<Vec<Clash>> {
        self.clashes.find_all_by_player(player_id).await
    }

    /// The actor's own notifications, newest first
    pub async fn list_notifications(
        &self,
        player_id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<Notification>> {
        check_permission(Some(actor), player_id)?;
        self.notifications.find_all_by_recipient(player_id).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a PENDING clash. The owner starts ACCEPTED with a fresh game,
    /// everyone else is INVITED and notified.
    pub async fn create(
        &self,
        name: &str,
        owner_id: Uuid,
        participant_ids: &[Uuid],
        clash_type: ClashType,
        actor: &Actor,
    ) -> Result<Clash> {
        validate_roster(participant_ids)?;
        if owner_id.is_nil() {
            return Err(ClashError::InvalidArgument("Invalid Player Id".into()));
        }
        if !participant_ids.contains(&owner_id) && !actor.is_admin() {
            return Err(ClashError::InvalidArgument(
                "Owner must be part of the clash".into(),
            ));
        }
        if clash_type == ClashType::Offline {
            let in_progress = self
                .clashes
                .count_by_player_status_type(
                    actor.player_id,
                    ClashStatus::InProgress,
                    ClashType::Offline,
                )
                .await?;
            if in_progress > self.config.offline_clash_limit {
                return Err(ClashError::IllegalState("Clash limit reached".into()));
            }
        }
        self.generator.require_player(owner_id).await?;
        self.ensure_invitable(owner_id, participant_ids).await?;

        let mut clash = Clash::new(name, owner_id, participant_ids, clash_type);
        if self
            .clashes
            .find_active(&clash.participant_hash, clash_type)
            .await?
            .is_some()
        {
            return Err(duplicate_clash());
        }

        // Held until the owner's game id is written, so a response arriving
        // through a query cannot be overwritten by that update.
        let _guard = self.locks.lock(clash.id).await;

        // The insert is the uniqueness gate; only the winner goes on to
        // create the owner's game.
        self.clashes.insert(&clash).await?;
        if let Err(e) = self.complete_creation(&mut clash, participant_ids).await {
            self.undo_creation(&clash).await;
            return Err(e);
        }

        info!(
            clash_id = %clash.id,
            owner_id = %owner_id,
            players = participant_ids.len(),
            clash_type = clash_type.as_str(),
            "Clash created"
        );
        self.publish_update(&clash, &[]);
        Ok(clash)
    }

    /// The invited player accepts; a game is created for them and the clash
    /// starts if the quorum is met
    pub async fn accept_invitation(
        &self,
        clash_id: Uuid,
        player_id: Uuid,
        actor: &Actor,
    ) -> Result<Clash> {
        check_permission(Some(actor), player_id)?;
        let _guard = self.locks.lock(clash_id).await;

        let mut clash = self.get_by_id(clash_id).await?;
        clash.ensure_can_respond(player_id)?;
        let game = self.games.create(player_id, GameType::Clash).await?;
        let committed = match clash.accept_invitation(player_id, game.id) {
            Ok(()) => {
                let started = clash.try_start();
                self.clashes.update(&clash).await.map(|()| started)
            }
            Err(e) => Err(e),
        };
        let started = match committed {
            Ok(started) => started,
            Err(e) => {
                self.discard_game(game.id).await;
                return Err(e);
            }
        };

        info!(clash_id = %clash_id, player_id = %player_id, started, "Invitation accepted");
        self.publish_update(&clash, &[]);
        Ok(clash)
    }

    /// The invited player declines; the clash may still start if enough
    /// others accepted
    pub async fn decline_invitation(
        &self,
        clash_id: Uuid,
        player_id: Uuid,
        actor: &Actor,
    ) -> Result<Clash> {
        check_permission(Some(actor), player_id)?;
        let _guard = self.locks.lock(clash_id).await;

        let mut clash = self.get_by_id(clash_id).await?;
        clash.decline_invitation(player_id)?;
        let started = clash.try_start();
        self.clashes.update(&clash).await?;

        info!(clash_id = %clash_id, player_id = %player_id, started, "Invitation declined");
        self.publish_update(&clash, &[]);
        Ok(clash)
    }

    /// Owner only. New entrants are INVITED and notified.
    pub async fn add_players(
        &self,
        clash_id: Uuid,
        player_ids: &[Uuid],
        actor: &Actor,
    ) -> Result<Clash> {
        let _guard = self.locks.lock(clash_id).await;

        let mut clash = self.get_by_id(clash_id).await?;
        check_permission(Some(actor), clash.owner_id)?;
        clash.add_players(player_ids)?;
        self.ensure_invitable(clash.owner_id, player_ids).await?;
        self.clashes.update(&clash).await?;

        info!(clash_id = %clash_id, added = player_ids.len(), "Players added to clash");
        self.notify(&clash, player_ids).await?;
        self.publish_update(&clash, &[]);
        Ok(clash)
    }

    /// Owner only. Removing players who have not answered can unblock the
    /// start.
    pub async fn remove_players(
        &self,
        clash_id: Uuid,
        player_ids: &[Uuid],
        actor: &Actor,
    ) -> Result<Clash> {
        let _guard = self.locks.lock(clash_id).await;

        let mut clash = self.get_by_id(clash_id).await?;
        check_permission(Some(actor), clash.owner_id)?;
        clash.remove_players(player_ids)?;
        let started = clash.try_start();
        self.clashes.update(&clash).await?;

        info!(
            clash_id = %clash_id,
            removed = player_ids.len(),
            started,
            "Players removed from clash"
        );
        self.publish_update(&clash, player_ids);
        Ok(clash)
    }

    /// Owner only
    pub async fn delete(&self, clash_id: Uuid, actor: &Actor) -> Result<()> {
        let guard = self.locks.lock(clash_id).await;

        let clash = self.get_by_id(clash_id).await?;
        check_permission(Some(actor), clash.owner_id)?;
        self.clashes.delete(clash_id).await?;
        drop(guard);

        info!(clash_id = %clash_id, "Clash deleted");
        for player_id in clash.player_ids() {
            self.dispatcher
                .send_to_player(player_id, &clash, MessageType::ClashDeleted);
        }
        Ok(())
    }

    /// Admin only
    pub async fn delete_all(&self, actor: &Actor) -> Result<u64> {
        require_admin(actor)?;
        let removed = self.clashes.delete_all().await?;
        info!(removed, "Deleted all clashes");
        Ok(removed)
    }

    /// Forget per-clash locks nobody holds
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Everything after the insert: the owner's game and the invitations
    async fn complete_creation(&self, clash: &mut Clash, participant_ids: &[Uuid]) -> Result<()> {
        if clash.contains(clash.owner_id) {
            let game = self.games.create(clash.owner_id, GameType::Clash).await?;
            if let Some(entry) = clash.player_mut(clash.owner_id) {
                entry.game_id = Some(game.id);
            }
            self.clashes.update(clash).await?;
        }
        self.notify(clash, participant_ids).await
    }

    /// Remove a clash whose creation failed part way, with the owner's game
    async fn undo_creation(&self, clash: &Clash) {
        if let Err(e) = self.clashes.delete(clash.id).await {
            warn!(clash_id = %clash.id, "Failed to remove partially created clash: {}", e);
        }
        let owner_game = clash.player(clash.owner_id).and_then(|p| p.game_id);
        if let Some(game_id) = owner_game {
            self.discard_game(game_id).await;
        }
        debug!(clash_id = %clash.id, "Clash creation rolled back");
    }

    async fn discard_game(&self, game_id: Uuid) {
        if let Err(e) = self.games.discard(game_id).await {
            warn!(game_id = %game_id, "Failed to discard game: {}", e);
        }
    }

    async fn ensure_invitable(&self, owner_id: Uuid, player_ids: &[Uuid]) -> Result<()> {
        let Some(gate) = &self.relationships else {
            return Ok(());
        };
        for &player_id in player_ids {
            gate.ensure_can_invite(owner_id, player_id).await?;
        }
        Ok(())
    }

    /// Persist invitations for `player_ids` and push them to their recipients
    async fn notify(&self, clash: &Clash, player_ids: &[Uuid]) -> Result<()> {
        let notifications = self.generator.invitations(clash, player_ids).await?;
        if notifications.is_empty() {
            return Ok(());
        }
        self.notifications.save_all(&notifications).await?;
        for notification in &notifications {
            self.dispatcher.send_to_player(
                notification.recipient_id,
                notification,
                MessageType::Notification,
            );
        }
        debug!(clash_id = %clash.id, count = notifications.len(), "Invitations sent");
        Ok(())
    }

    /// Send the current clash to every roster member plus `also`
    fn publish_update(&self, clash: &Clash, also: &[Uuid]) {
        for player_id in clash.player_ids().into_iter().chain(also.iter().copied()) {
            self.dispatcher
                .send_to_player(player_id, clash, MessageType::ClashUpdated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Game, InvitationState, Player};
    use crate::realtime::{private_destination, ChannelTransport};
    use crate::services::StoredGames;
    use crate::store::{
        GameStore, MemoryClashStore, MemoryGameStore, MemoryNotificationStore, MemoryPlayerStore,
        PlayerStore,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct Fixture {
        coordinator: Arc<ClashCoordinator>,
        transport: Arc<ChannelTransport>,
        notifications: Arc<MemoryNotificationStore>,
        games: Arc<MemoryGameStore>,
        players: Vec<Uuid>,
    }

    async fn fixture(config: ClashCoordinatorConfig) -> Fixture {
        let games = Arc::new(MemoryGameStore::new());
        let lifecycle = Arc::new(StoredGames::new(games.clone()));
        fixture_with(config, Arc::new(MemoryClashStore::new()), games, lifecycle).await
    }

    async fn fixture_with(
        config: ClashCoordinatorConfig,
        clashes: Arc<dyn ClashStore>,
        games: Arc<MemoryGameStore>,
        lifecycle: Arc<dyn GameLifecycle>,
    ) -> Fixture {
        let player_store = Arc::new(MemoryPlayerStore::new());
        let mut players = Vec::new();
        for name in ["alice", "bob", "carol", "dave", "erin"] {
            let player = Player::anonymous(name);
            player_store.save(&player).await.unwrap();
            players.push(player.id);
        }
        let transport = Arc::new(ChannelTransport::new(32));
        let notifications = Arc::new(MemoryNotificationStore::new());
        let coordinator = ClashCoordinator::new(
            config,
            clashes,
            notifications.clone(),
            lifecycle,
            NotificationGenerator::new(player_store),
            EventDispatcher::new(transport.clone()),
        );
        Fixture {
            coordinator: Arc::new(coordinator),
            transport,
            notifications,
            games,
            players,
        }
    }

    /// Game lifecycle that can be switched to fail, or made to wait on a
    /// permit for its next game
    struct ControlledGames {
        inner: StoredGames,
        fail: AtomicBool,
        hold_next: AtomicBool,
        release: Semaphore,
    }

    impl ControlledGames {
        fn new(store: Arc<MemoryGameStore>) -> Self {
            Self {
                inner: StoredGames::new(store),
                fail: AtomicBool::new(false),
                hold_next: AtomicBool::new(false),
                release: Semaphore::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl GameLifecycle for ControlledGames {
        async fn create(&self, owner_id: Uuid, game_type: GameType) -> Result<Game> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClashError::Storage("game engine unavailable".into()));
            }
            if self.hold_next.swap(false, Ordering::SeqCst) {
                let _permit = self
                    .release
                    .acquire()
                    .await
                    .map_err(|e| ClashError::Internal(e.to_string()))?;
            }
            self.inner.create(owner_id, game_type).await
        }

        async fn discard(&self, game_id: Uuid) -> Result<()> {
            self.inner.discard(game_id).await
        }
    }

    /// Memory clash store whose updates can be switched to fail
    #[derive(Default)]
    struct FlakyClashStore {
        inner: MemoryClashStore,
        fail_updates: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ClashStore for FlakyClashStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Clash>> {
            self.inner.find_by_id(id).await
        }

        async fn find_all_by_player(&self, player_id: Uuid) -> Result<Vec<Clash>> {
            self.inner.find_all_by_player(player_id).await
        }

        async fn find_active(
            &self,
            participant_hash: &str,
            clash_type: ClashType,
        ) -> Result<Option<Clash>> {
            self.inner.find_active(participant_hash, clash_type).await
        }

        async fn count_by_player_status_type(
            &self,
            player_id: Uuid,
            status: ClashStatus,
            clash_type: ClashType,
        ) -> Result<u64> {
            self.inner
                .count_by_player_status_type(player_id, status, clash_type)
                .await
        }

        async fn insert(&self, clash: &Clash) -> Result<()> {
            self.inner.insert(clash).await
        }

        async fn update(&self, clash: &Clash) -> Result<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(ClashError::Storage("write rejected".into()));
            }
            self.inner.update(clash).await
        }

        async fn delete(&self, id: Uuid) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn delete_all(&self) -> Result<u64> {
            self.inner.delete_all().await
        }

        async fn list(&self, page: PageRequest) -> Result<Page<Clash>> {
            self.inner.list(page).await
        }
    }

    #[tokio::test]
    async fn test_create_initial_roster() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let clash = f
            .coordinator
            .create("Friday", p[0], &p[..3], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();

        assert_eq!(clash.status, ClashStatus::Pending);
        let owner = clash.player(p[0]).unwrap();
        assert_eq!(owner.state, InvitationState::Accepted);
        let game_id = owner.game_id.unwrap();
        assert!(f.games.find_by_id(game_id).await.unwrap().is_some());
        assert_eq!(clash.player(p[1]).unwrap().state, InvitationState::Invited);
        assert_eq!(clash.player(p[2]).unwrap().state, InvitationState::Invited);

        let stored = f.coordinator.get_by_id(clash.id).await.unwrap();
        assert_eq!(stored.player(p[0]).unwrap().game_id, Some(game_id));

        assert!(f.notifications.find_all_by_recipient(p[0]).await.unwrap().is_empty());
        assert_eq!(f.notifications.find_all_by_recipient(p[1]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_owner_must_be_in_roster_unless_admin() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;

        let result = f
            .coordinator
            .create("c", p[0], &p[1..3], ClashType::Online, &Actor::user(p[0]))
            .await;
        assert!(matches!(result, Err(ClashError::InvalidArgument(_))));

        let clash = f
            .coordinator
            .create("c", p[0], &p[1..3], ClashType::Online, &Actor::admin(p[4]))
            .await
            .unwrap();
        assert_eq!(clash.owner_id, p[0]);
        assert!(!clash.contains(p[0]));
    }

    #[tokio::test]
    async fn test_duplicate_participant_set_conflicts() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let actor = Actor::user(p[0]);
        f.coordinator
            .create("a", p[0], &[p[0], p[1]], ClashType::Online, &actor)
            .await
            .unwrap();

        let again = f
            .coordinator
            .create("b", p[0], &[p[1], p[0]], ClashType::Online, &actor)
            .await;
        assert!(matches!(again, Err(ClashError::Conflict(_))));

        f.coordinator
            .create("c", p[0], &[p[0], p[1]], ClashType::Offline, &actor)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_offline_limit() {
        let f = fixture(ClashCoordinatorConfig {
            offline_clash_limit: 0,
        })
        .await;
        let p = &f.players;
        let clash = f
            .coordinator
            .create("a", p[0], &[p[0], p[1]], ClashType::Offline, &Actor::user(p[0]))
            .await
            .unwrap();
        let started = f
            .coordinator
            .accept_invitation(clash.id, p[1], &Actor::user(p[1]))
            .await
            .unwrap();
        assert_eq!(started.status, ClashStatus::InProgress);

        let refused = f
            .coordinator
            .create("b", p[0], &[p[0], p[2]], ClashType::Offline, &Actor::user(p[0]))
            .await;
        assert!(matches!(refused, Err(ClashError::IllegalState(_))));

        f.coordinator
            .create("c", p[0], &[p[0], p[2]], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_respond_for_someone_else_is_denied() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let clash = f
            .coordinator
            .create("c", p[0], &p[..3], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();

        let result = f
            .coordinator
            .accept_invitation(clash.id, p[1], &Actor::user(p[2]))
            .await;
        assert!(matches!(result, Err(ClashError::PermissionDenied(_))));

        let result = f
            .coordinator
            .decline_invitation(Uuid::new_v4(), p[1], &Actor::user(p[1]))
            .await;
        assert!(matches!(result, Err(ClashError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_roster_edits_are_owner_only() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let clash = f
            .coordinator
            .create("c", p[0], &p[..2], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();

        let denied = f
            .coordinator
            .add_players(clash.id, &[p[2]], &Actor::user(p[1]))
            .await;
        assert!(matches!(denied, Err(ClashError::PermissionDenied(_))));

        let grown = f
            .coordinator
            .add_players(clash.id, &[p[2], p[3]], &Actor::user(p[0]))
            .await
            .unwrap();
        assert_eq!(grown.players.len(), 4);
        assert_eq!(f.notifications.find_all_by_recipient(p[3]).await.unwrap().len(), 1);

        let too_many = f
            .coordinator
            .add_players(clash.id, &[p[4]], &Actor::user(p[0]))
            .await;
        assert!(matches!(too_many, Err(ClashError::InvalidArgument(_))));

        let denied = f
            .coordinator
            .remove_players(clash.id, &[p[3]], &Actor::user(p[2]))
            .await;
        assert!(matches!(denied, Err(ClashError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_remove_non_responders_starts_clash() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let clash = f
            .coordinator
            .create("c", p[0], &p[..3], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();
        f.coordinator
            .accept_invitation(clash.id, p[1], &Actor::user(p[1]))
            .await
            .unwrap();

        let mut removed_rx = f.transport.subscribe(&private_destination(p[2]));
        let clash = f
            .coordinator
            .remove_players(clash.id, &[p[2]], &Actor::user(p[0]))
            .await
            .unwrap();
        assert_eq!(clash.status, ClashStatus::InProgress);
        assert_eq!(clash.accepted_count(), 2);

        let envelope = removed_rx.recv().await.unwrap();
        assert_eq!(envelope.message_type, MessageType::ClashUpdated);
    }

    #[tokio::test]
    async fn test_updates_reach_roster() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let mut rx = f.transport.subscribe(&private_destination(p[1]));

        let clash = f
            .coordinator
            .create("c", p[0], &p[..2], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.message_type, MessageType::Notification);
        let update = rx.recv().await.unwrap();
        assert_eq!(update.message_type, MessageType::ClashUpdated);
        let payload: Clash = serde_json::from_slice(&update.payload).unwrap();
        assert_eq!(payload.id, clash.id);
    }

    #[tokio::test]
    async fn test_delete_is_owner_only() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let clash = f
            .coordinator
            .create("c", p[0], &p[..2], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();

        assert!(matches!(
            f.coordinator.delete(clash.id, &Actor::user(p[1])).await,
            Err(ClashError::PermissionDenied(_))
        ));
        f.coordinator.delete(clash.id, &Actor::user(p[0])).await.unwrap();
        assert!(matches!(
            f.coordinator.get_by_id(clash.id).await,
            Err(ClashError::NotFound(_))
        ));

        // The participant set is free again
        f.coordinator
            .create("again", p[0], &p[..2], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();
        assert!(f.coordinator.delete_all(&Actor::user(p[0])).await.is_err());
        assert_eq!(f.coordinator.delete_all(&Actor::admin(p[0])).await.unwrap(), 1);
    }

    // ========================================================================
    // Failure handling
    // ========================================================================

    #[tokio::test]
    async fn test_failed_game_creation_leaves_no_clash() {
        let games = Arc::new(MemoryGameStore::new());
        let lifecycle = Arc::new(ControlledGames::new(games.clone()));
        lifecycle.fail.store(true, Ordering::SeqCst);
        let f = fixture_with(
            ClashCoordinatorConfig::default(),
            Arc::new(MemoryClashStore::new()),
            games,
            lifecycle.clone(),
        )
        .await;
        let p = &f.players;
        let actor = Actor::user(p[0]);

        let failed = f
            .coordinator
            .create("c", p[0], &[p[0], p[1]], ClashType::Online, &actor)
            .await;
        assert!(matches!(failed, Err(ClashError::Storage(_))));
        assert_eq!(f.coordinator.list(PageRequest::default()).await.unwrap().total, 0);
        assert!(f.notifications.find_all_by_recipient(p[1]).await.unwrap().is_empty());

        lifecycle.fail.store(false, Ordering::SeqCst);
        let retry = f
            .coordinator
            .create("c", p[0], &[p[0], p[1]], ClashType::Online, &actor)
            .await
            .unwrap();
        assert!(retry.player(p[0]).unwrap().game_id.is_some());
    }

    #[tokio::test]
    async fn test_failed_update_discards_new_games() {
        let clashes = Arc::new(FlakyClashStore::default());
        let games = Arc::new(MemoryGameStore::new());
        let lifecycle = Arc::new(StoredGames::new(games.clone()));
        let f = fixture_with(
            ClashCoordinatorConfig::default(),
            clashes.clone(),
            games,
            lifecycle,
        )
        .await;
        let p = &f.players;

        clashes.fail_updates.store(true, Ordering::SeqCst);
        let failed = f
            .coordinator
            .create("c", p[0], &[p[0], p[1]], ClashType::Online, &Actor::user(p[0]))
            .await;
        assert!(matches!(failed, Err(ClashError::Storage(_))));
        assert!(clashes.inner.is_empty());
        assert!(f.games.find_all_by_owner(p[0]).await.unwrap().is_empty());

        clashes.fail_updates.store(false, Ordering::SeqCst);
        let clash = f
            .coordinator
            .create("c", p[0], &[p[0], p[1]], ClashType::Online, &Actor::user(p[0]))
            .await
            .unwrap();

        clashes.fail_updates.store(true, Ordering::SeqCst);
        let refused = f
            .coordinator
            .accept_invitation(clash.id, p[1], &Actor::user(p[1]))
            .await;
        assert!(matches!(refused, Err(ClashError::Storage(_))));
        assert!(f.games.find_all_by_owner(p[1]).await.unwrap().is_empty());
        let stored = f.coordinator.get_by_id(clash.id).await.unwrap();
        assert_eq!(stored.player(p[1]).unwrap().state, InvitationState::Invited);
    }

    #[tokio::test]
    async fn test_conflicting_create_builds_no_game() {
        let f = fixture(ClashCoordinatorConfig::default()).await;
        let p = &f.players;
        let actor = Actor::user(p[0]);
        f.coordinator
            .create("a", p[0], &[p[0], p[1]], ClashType::Online, &actor)
            .await
            .unwrap();

        let again = f
            .coordinator
            .create("b", p[0], &[p[1], p[0]], ClashType::Online, &actor)
            .await;
        assert!(matches!(again, Err(ClashError::Conflict(_))));
        assert_eq!(f.games.find_all_by_owner(p[0]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_response_waits_for_owner_game() {
        let games = Arc::new(MemoryGameStore::new());
        let lifecycle = Arc::new(ControlledGames::new(games.clone()));
        lifecycle.hold_next.store(true, Ordering::SeqCst);
        let f = fixture_with(
            ClashCoordinatorConfig::default(),
            Arc::new(MemoryClashStore::new()),
            games,
            lifecycle.clone(),
        )
        .await;
        let (owner, invitee) = (f.players[0], f.players[1]);

        let creating = {
            let coordinator = Arc::clone(&f.coordinator);
            tokio::spawn(async move {
                coordinator
                    .create("c", owner, &[owner, invitee], ClashType::Online, &Actor::user(owner))
                    .await
            })
        };

        // The clash is visible as soon as it is inserted
        let clash_id = loop {
            let listed = f.coordinator.list_for_player(invitee).await.unwrap();
            if let Some(clash) = listed.first() {
                break clash.id;
            }
            tokio::task::yield_now().await;
        };

        let accepting = {
            let coordinator = Arc::clone(&f.coordinator);
            tokio::spawn(async move {
                coordinator
                    .accept_invitation(clash_id, invitee, &Actor::user(invitee))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!accepting.is_finished());

        lifecycle.release.add_permits(1);
        creating.await.unwrap().unwrap();
        accepting.await.unwrap().unwrap();

        let stored = f.coordinator.get_by_id(clash_id).await.unwrap();
        assert!(stored.player(owner).unwrap().game_id.is_some());
        assert_eq!(stored.player(invitee).unwrap().state, InvitationState::Accepted);
        assert_eq!(stored.status, ClashStatus::InProgress);
    }
}
