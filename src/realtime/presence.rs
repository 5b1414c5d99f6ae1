//! Presence directory
//!
//! Tracks which players are online and which destination each subscription
//! points at. The two maps are independent; each key is updated atomically
//! and the last write per key wins. Nothing here gates delivery.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerStatus {
    Online,
    Offline,
}

/// Snapshot for diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStats {
    pub online_players: usize,
    pub known_players: usize,
    pub subscriptions: usize,
}

#[derive(Default)]
pub struct PresenceDirectory {
    statuses: DashMap<Uuid, PlayerStatus>,
    subscriptions: DashMap<String, String>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session connected
    pub fn connect(&self, player_id: Uuid) {
        self.set_status(player_id, PlayerStatus::Online);
        info!(player_id = %player_id, "Player connected");
    }

    /// Session disconnected
    pub fn disconnect(&self, player_id: Uuid) {
        self.set_status(player_id, PlayerStatus::Offline);
        info!(player_id = %player_id, "Player disconnected");
    }

    pub fn set_status(&self, player_id: Uuid, status: PlayerStatus) {
        self.statuses.insert(player_id, status);
    }

    /// Unknown players are OFFLINE
    pub fn status(&self, player_id: Uuid) -> PlayerStatus {
        self.statuses
            .get(&player_id)
            .map(|s| *s)
            .unwrap_or(PlayerStatus::Offline)
    }

    pub fn is_online(&self, player_id: Uuid) -> bool {
        self.status(player_id) == PlayerStatus::Online
    }

    pub fn online_players(&self) -> Vec<Uuid> {
        self.statuses
            .iter()
            .filter(|entry| *entry.value() == PlayerStatus::Online)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Record a subscription; re-subscribing with the same id overwrites
    pub fn subscribe(&self, subscription_id: impl Into<String>, destination: impl Into<String>) {
        let subscription_id = subscription_id.into();
        let destination = destination.into();
        debug!(subscription_id = %subscription_id, destination = %destination, "Subscribed");
        self.subscriptions.insert(subscription_id, destination);
    }

    /// Drop a subscription, returning the destination it pointed at
    pub fn unsubscribe(&self, subscription_id: &str) -> Option<String> {
        match self.subscriptions.remove(subscription_id) {
            Some((_, destination)) => {
                debug!(
                    subscription_id = %subscription_id,
                    destination = %destination,
                    "Unsubscribed"
                );
                Some(destination)
            }
            None => {
                debug!(
                    subscription_id = %subscription_id,
                    "Unsubscribed, but the destination is unknown"
                );
                None
            }
        }
    }

    pub fn destination(&self, subscription_id: &str) -> Option<String> {
        self.subscriptions
            .get(subscription_id)
            .map(|d| d.value().clone())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn stats(&self) -> PresenceStats {
        PresenceStats {
            online_players: self.online_players().len(),
            known_players: self.statuses.len(),
            subscriptions: self.subscriptions.len(),
        }
    }
}
