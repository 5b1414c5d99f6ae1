//! In-memory stores
//!
//! Records live in `DashMap`s keyed by id. The clash and relationship stores
//! keep a secondary uniqueness index behind an async mutex so that the
//! check and the write happen as one step relative to concurrent writers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    duplicate_clash, ClashStore, GameStore, NotificationStore, Page, PageRequest, PlayerStore,
    RelationshipStore,
};
use crate::model::{
    Clash, ClashStatus, ClashType, Game, Notification, PairKey, Player, PlayerRelationship,
};
use crate::types::{ClashError, Result};

/// Record stored in a `MemoryTable`
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Record for Clash {
    fn id(&self) -> Uuid {
        self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Player {
    fn id(&self) -> Uuid {
        self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Game {
    fn id(&self) -> Uuid {
        self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for PlayerRelationship {
    fn id(&self) -> Uuid {
        self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Notification {
    fn id(&self) -> Uuid {
        self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Id-keyed table shared by the memory stores
pub struct MemoryTable<T: Record> {
    rows: DashMap<Uuid, T>,
}

impl<T: Record> MemoryTable<T> {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<T> {
        self.rows.get(&id).map(|row| row.value().clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn put(&self, row: T) {
        self.rows.insert(row.id(), row);
    }

    pub fn remove(&self, id: Uuid) -> Option<T> {
        self.rows.remove(&id).map(|(_, row)| row)
    }

    pub fn clear(&self) -> u64 {
        let count = self.rows.len() as u64;
        self.rows.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows matching `filter`, newest first
    pub fn filter<F>(&self, filter: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut rows: Vec<T> = self
            .rows
            .iter()
            .filter(|row| filter(row.value()))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(a.id().cmp(&b.id())));
        rows
    }

    pub fn page(&self, request: PageRequest) -> Page<T> {
        request.apply(self.filter(|_| true))
    }
}

impl<T: Record> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Clashes
// ============================================================================

type ActiveKey = (String, ClashType);

fn active_key(clash: &Clash) -> Option<ActiveKey> {
    clash
        .is_active()
        .then(|| (clash.participant_hash.clone(), clash.clash_type))
}

/// Clash store with an active (participant hash, type) index
#[derive(Default)]
pub struct MemoryClashStore {
    clashes: MemoryTable<Clash>,
    active: Mutex<HashMap<ActiveKey, Uuid>>,
}

impl MemoryClashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clashes.is_empty()
    }
}

#[async_trait::async_trait]
impl ClashStore for MemoryClashStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Clash>> {
        Ok(self.clashes.get(id))
    }

    async fn find_all_by_player(&self, player_id: Uuid) -> Result<Vec<Clash>> {
        let mut clashes = self.clashes.filter(|c| c.contains(player_id));
        clashes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(clashes)
    }

    async fn find_active(
        &self,
        participant_hash: &str,
        clash_type: ClashType,
    ) -> Result<Option<Clash>> {
        let key = (participant_hash.to_string(), clash_type);
        let id = self.active.lock().await.get(&key).copied();
        Ok(id.and_then(|id| self.clashes.get(id)))
    }

    async fn count_by_player_status_type(
        &self,
        player_id: Uuid,
        status: ClashStatus,
        clash_type: ClashType,
    ) -> Result<u64> {
        let count = self
            .clashes
            .filter(|c| c.status == status && c.clash_type == clash_type && c.contains(player_id))
            .len();
        Ok(count as u64)
    }

    async fn insert(&self, clash: &Clash) -> Result<()> {
        let mut active = self.active.lock().await;
        if self.clashes.contains(clash.id) {
            return Err(ClashError::Conflict(format!("Clash {} already exists", clash.id)));
        }
        if let Some(key) = active_key(clash) {
            if active.contains_key(&key) {
                return Err(duplicate_clash());
            }
            active.insert(key, clash.id);
        }
        self.clashes.put(clash.clone());
        debug!(clash_id = %clash.id, "Stored clash");
        Ok(())
    }

    async fn update(&self, clash: &Clash) -> Result<()> {
        let mut active = self.active.lock().await;
        let stored = self
            .clashes
            .get(clash.id)
            .ok_or_else(|| ClashError::NotFound(format!("Clash {}", clash.id)))?;

        let new_key = active_key(clash);
        if let Some(key) = &new_key {
            if matches!(active.get(key), Some(owner) if *owner != clash.id) {
                return Err(duplicate_clash());
            }
        }
        if let Some(old_key) = active_key(&stored) {
            if active.get(&old_key) == Some(&clash.id) {
                active.remove(&old_key);
            }
        }
        if let Some(key) = new_key {
            active.insert(key, clash.id);
        }
        self.clashes.put(clash.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut active = self.active.lock().await;
        match self.clashes.remove(id) {
            Some(clash) => {
                if let Some(key) = active_key(&clash) {
                    if active.get(&key) == Some(&id) {
                        active.remove(&key);
                    }
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut active = self.active.lock().await;
        active.clear();
        Ok(self.clashes.clear())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Clash>> {
        Ok(self.clashes.page(page))
    }
}

// ============================================================================
// Players
// ============================================================================

#[derive(Default)]
pub struct MemoryPlayerStore {
    players: MemoryTable<Player>,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PlayerStore for MemoryPlayerStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Player>> {
        Ok(self.players.get(id))
    }

    async fn find_all_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Player>> {
        Ok(ids.iter().filter_map(|id| self.players.get(*id)).collect())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        Ok(!self.players.filter(|p| p.username == username).is_empty())
    }

    async fn save(&self, player: &Player) -> Result<()> {
        self.players.put(player.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.players.remove(id).is_some())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Player>> {
        Ok(self.players.page(page))
    }
}

// ============================================================================
// Games
// ============================================================================

#[derive(Default)]
pub struct MemoryGameStore {
    games: MemoryTable<Game>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl GameStore for MemoryGameStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Game>> {
        Ok(self.games.get(id))
    }

    async fn find_all_by_owner(&self, owner_id: Uuid) -> Result<Vec<Game>> {
        Ok(self.games.filter(|g| g.owner_id == owner_id))
    }

    async fn save(&self, game: &Game) -> Result<()> {
        self.games.put(game.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.games.remove(id).is_some())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Game>> {
        Ok(self.games.page(page))
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Relationship store with one edge per unordered pair
#[derive(Default)]
pub struct MemoryRelationshipStore {
    edges: MemoryTable<PlayerRelationship>,
    pairs: Mutex<HashMap<PairKey, Uuid>>,
}

impl MemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PlayerRelationship>> {
        Ok(self.edges.get(id))
    }

    async fn find_between(&self, a: Uuid, b: Uuid) -> Result<Option<PlayerRelationship>> {
        let id = self.pairs.lock().await.get(&PairKey::new(a, b)).copied();
        Ok(id.and_then(|id| self.edges.get(id)))
    }

    async fn find_all_by_player(&self, player_id: Uuid) -> Result<Vec<PlayerRelationship>> {
        Ok(self.edges.filter(|r| r.involves(player_id)))
    }

    async fn insert(&self, relationship: &PlayerRelationship) -> Result<()> {
        let mut pairs = self.pairs.lock().await;
        let pair = relationship.pair();
        if pairs.contains_key(&pair) {
            return Err(ClashError::Conflict(
                "A relationship between those players already exists".into(),
            ));
        }
        pairs.insert(pair, relationship.id);
        self.edges.put(relationship.clone());
        Ok(())
    }

    async fn update(&self, relationship: &PlayerRelationship) -> Result<()> {
        let _pairs = self.pairs.lock().await;
        if !self.edges.contains(relationship.id) {
            return Err(ClashError::NotFound(format!(
                "Relationship {}",
                relationship.id
            )));
        }
        self.edges.put(relationship.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut pairs = self.pairs.lock().await;
        match self.edges.remove(id) {
            Some(edge) => {
                if pairs.get(&edge.pair()) == Some(&id) {
                    pairs.remove(&edge.pair());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut pairs = self.pairs.lock().await;
        pairs.clear();
        Ok(self.edges.clear())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<PlayerRelationship>> {
        Ok(self.edges.page(page))
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: MemoryTable<Notification>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.get(id))
    }

    async fn find_all_by_recipient(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        Ok(self.notifications.filter(|n| n.recipient_id == recipient_id))
    }

    async fn save_all(&self, notifications: &[Notification]) -> Result<()> {
        for notification in notifications {
            self.notifications.put(notification.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.notifications.remove(id).is_some())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Notification>> {
        Ok(self.notifications.page(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelationshipType;
    use std::sync::Arc;

    fn roster(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_active_clash() {
        let store = MemoryClashStore::new();
        let players = roster(3);
        let first = Clash::new("a", players[0], &players, ClashType::Online);
        store.insert(&first).await.unwrap();

        let shuffled = vec![players[2], players[0], players[1]];
        let second = Clash::new("b", players[2], &shuffled, ClashType::Online);
        assert!(matches!(
            store.insert(&second).await,
            Err(ClashError::Conflict(_))
        ));

        let offline = Clash::new("c", players[0], &players, ClashType::Offline);
        store.insert(&offline).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_finished_clash_frees_participant_set() {
        let store = MemoryClashStore::new();
        let players = roster(2);
        let mut clash = Clash::new("a", players[0], &players, ClashType::Online);
        store.insert(&clash).await.unwrap();

        clash.status = ClashStatus::Finished;
        store.update(&clash).await.unwrap();

        let again = Clash::new("b", players[0], &players, ClashType::Online);
        store.insert(&again).await.unwrap();
        assert!(store
            .find_active(&again.participant_hash, ClashType::Online)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_update_cannot_collide_with_other_clash() {
        let store = MemoryClashStore::new();
        let p = roster(3);
        let taken = Clash::new("taken", p[0], &p[..2], ClashType::Online);
        store.insert(&taken).await.unwrap();

        let mut other = Clash::new("other", p[0], &p, ClashType::Online);
        store.insert(&other).await.unwrap();
        other.remove_players(&[p[2]]).unwrap();
        assert!(matches!(
            store.update(&other).await,
            Err(ClashError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_yield_one_clash() {
        let store = Arc::new(MemoryClashStore::new());
        let players = roster(4);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let players = players.clone();
            handles.push(tokio::spawn(async move {
                let clash =
                    Clash::new(format!("race-{i}"), players[0], &players, ClashType::Online);
                store.insert(&clash).await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(ClashError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_clears_active_index() {
        let store = MemoryClashStore::new();
        let players = roster(2);
        let clash = Clash::new("a", players[0], &players, ClashType::Online);
        store.insert(&clash).await.unwrap();
        assert!(store.delete(clash.id).await.unwrap());
        assert!(!store.delete(clash.id).await.unwrap());
        assert!(store
            .find_active(&clash.participant_hash, ClashType::Online)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_all_by_player_orders_by_update() {
        let store = MemoryClashStore::new();
        let p = roster(3);
        let mut older = Clash::new("older", p[0], &p[..2], ClashType::Online);
        store.insert(&older).await.unwrap();
        let newer = Clash::new("newer", p[0], &p, ClashType::Online);
        store.insert(&newer).await.unwrap();

        older.decline_invitation(p[1]).unwrap();
        older.updated_at = newer.updated_at + chrono::Duration::seconds(1);
        store.update(&older).await.unwrap();

        let found = store.find_all_by_player(p[0]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, older.id);
        assert_eq!(store.find_all_by_player(p[2]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_relationship_pair_is_unique() {
        let store = MemoryRelationshipStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let edge = PlayerRelationship::new(a, b, RelationshipType::Friend);
        store.insert(&edge).await.unwrap();

        let reverse = PlayerRelationship::new(b, a, RelationshipType::Friend);
        assert!(store.insert(&reverse).await.is_err());
        assert_eq!(store.find_between(b, a).await.unwrap().unwrap().id, edge.id);

        assert!(store.delete(edge.id).await.unwrap());
        assert!(store.find_between(a, b).await.unwrap().is_none());
        store.insert(&reverse).await.unwrap();
    }

    #[tokio::test]
    async fn test_paged_listing() {
        let store = MemoryPlayerStore::new();
        for i in 0..5 {
            store.save(&Player::anonymous(format!("player{i}"))).await.unwrap();
        }
        let page = store.list(PageRequest::new(0, 2)).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert!(store.exists_by_username("player3").await.unwrap());
        assert!(!store.exists_by_username("nobody").await.unwrap());
    }
}
