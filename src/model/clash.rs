//! Clash aggregate
//!
//! A clash is one match invitation among 2-4 players. The roster holds one
//! entry per player; the participant hash is recomputed whenever the roster
//! changes so that active clashes can be de-duplicated by player set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use uuid::Uuid;

use crate::types::{ClashError, Result};

/// Smallest allowed roster
pub const MIN_PLAYERS: usize = 2;

/// Largest allowed roster
pub const MAX_PLAYERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClashStatus {
    Pending,
    InProgress,
    Finished,
}

impl ClashStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClashStatus::Pending => "PENDING",
            ClashStatus::InProgress => "IN_PROGRESS",
            ClashStatus::Finished => "FINISHED",
        }
    }

    /// Pending and in-progress clashes count against de-duplication
    pub fn is_active(&self) -> bool {
        matches!(self, ClashStatus::Pending | ClashStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClashType {
    Online,
    Offline,
}

impl ClashType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClashType::Online => "ONLINE",
            ClashType::Offline => "OFFLINE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvitationState {
    Invited,
    Accepted,
    Declined,
}

impl InvitationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationState::Invited => "INVITED",
            InvitationState::Accepted => "ACCEPTED",
            InvitationState::Declined => "DECLINED",
        }
    }

    /// Accepted or declined
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationState::Invited)
    }
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClashPlayer {
    pub player_id: Uuid,
    pub state: InvitationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Uuid>,
}

impl ClashPlayer {
    pub fn invited(player_id: Uuid) -> Self {
        Self {
            player_id,
            state: InvitationState::Invited,
            game_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clash {
    pub id: Uuid,
    pub name: String,
    pub status: ClashStatus,
    #[serde(rename = "type")]
    pub clash_type: ClashType,
    pub owner_id: Uuid,
    pub players: Vec<ClashPlayer>,
    pub participant_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order-independent digest of a set of player ids
pub fn participant_hash<'a, I>(ids: I) -> String
where
    I: IntoIterator<Item = &'a Uuid>,
{
    let mut sorted: Vec<&Uuid> = ids.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Validate a requested roster: 2-4 distinct, non-nil ids
pub fn validate_roster(ids: &[Uuid]) -> Result<()> {
    if ids.len() < MIN_PLAYERS || ids.len() > MAX_PLAYERS {
        return Err(ClashError::InvalidArgument(format!(
            "Number of players must be between {} and {}",
            MIN_PLAYERS, MAX_PLAYERS
        )));
    }
    if ids.iter().any(Uuid::is_nil) {
        return Err(ClashError::InvalidArgument("Invalid Player Id".into()));
    }
    let distinct: HashSet<&Uuid> = ids.iter().collect();
    if distinct.len() != ids.len() {
        return Err(ClashError::InvalidArgument(
            "Duplicate players in roster".into(),
        ));
    }
    Ok(())
}

impl Clash {
    /// Build a pending clash. The owner's entry starts ACCEPTED, everyone
    /// else INVITED. The roster is assumed to be validated already.
    pub fn new(
        name: impl Into<String>,
        owner_id: Uuid,
        player_ids: &[Uuid],
        clash_type: ClashType,
    ) -> Self {
        let now = Utc::now();
        let players: Vec<ClashPlayer> = player_ids
            .iter()
            .map(|&id| ClashPlayer {
                player_id: id,
                state: if id == owner_id {
                    InvitationState::Accepted
                } else {
                    InvitationState::Invited
                },
                game_id: None,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: ClashStatus::Pending,
            clash_type,
            owner_id,
            participant_hash: participant_hash(player_ids),
            players,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn player_ids(&self) -> Vec<Uuid> {
        self.players.iter().map(|p| p.player_id).collect()
    }

    pub fn player(&self, player_id: Uuid) -> Option<&ClashPlayer> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn player_mut(&mut self, player_id: Uuid) -> Option<&mut ClashPlayer> {
        self.players.iter_mut().find(|p| p.player_id == player_id)
    }

    pub fn contains(&self, player_id: Uuid) -> bool {
        self.player(player_id).is_some()
    }

    pub fn accepted_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.state == InvitationState::Accepted)
            .count()
    }

    /// Fail unless a roster entry for `player_id` can still respond
    pub fn ensure_can_respond(&self, player_id: Uuid) -> Result<()> {
        if !self.is_active() {
            return Err(ClashError::IllegalState(format!(
                "Clash is {}",
                self.status.as_str()
            )));
        }
        let entry = self.player(player_id).ok_or_else(|| {
            ClashError::NotFound(format!("Player {} is not part of the clash", player_id))
        })?;
        if entry.state.is_terminal() {
            return Err(ClashError::IllegalState(format!(
                "Invitation already {}",
                entry.state.as_str()
            )));
        }
        Ok(())
    }

    /// Mark the player's entry ACCEPTED and attach their game
    pub fn accept_invitation(&mut self, player_id: Uuid, game_id: Uuid) -> Result<()> {
        self.ensure_can_respond(player_id)?;
        if let Some(entry) = self.player_mut(player_id) {
            entry.state = InvitationState::Accepted;
            entry.game_id = Some(game_id);
        }
        self.touch();
        Ok(())
    }

    /// Mark the player's entry DECLINED
    pub fn decline_invitation(&mut self, player_id: Uuid) -> Result<()> {
        self.ensure_can_respond(player_id)?;
        if let Some(entry) = self.player_mut(player_id) {
            entry.state = InvitationState::Declined;
        }
        self.touch();
        Ok(())
    }

    /// Add INVITED entries. All ids are checked before the roster changes.
    pub fn add_players(&mut self, player_ids: &[Uuid]) -> Result<()> {
        self.ensure_editable()?;
        if player_ids.is_empty() {
            return Err(ClashError::InvalidArgument("No players to add".into()));
        }
        if player_ids.iter().any(Uuid::is_nil) {
            return Err(ClashError::InvalidArgument("Invalid Player Id".into()));
        }
        let mut seen = HashSet::new();
        for id in player_ids {
            if self.contains(*id) || !seen.insert(*id) {
                return Err(ClashError::InvalidArgument(format!(
                    "Player {} is already part of the clash",
                    id
                )));
            }
        }
        if self.players.len() + player_ids.len() > MAX_PLAYERS {
            return Err(ClashError::InvalidArgument(format!(
                "A clash can have at most {} players",
                MAX_PLAYERS
            )));
        }

        self.players
            .extend(player_ids.iter().map(|&id| ClashPlayer::invited(id)));
        self.refresh_hash();
        self.touch();
        Ok(())
    }

    /// Remove entries. The owner cannot be removed and the roster may not
    /// shrink below the minimum.
    pub fn remove_players(&mut self, player_ids: &[Uuid]) -> Result<()> {
        self.ensure_editable()?;
        if player_ids.is_empty() {
            return Err(ClashError::InvalidArgument("No players to remove".into()));
        }
        let to_remove: HashSet<Uuid> = player_ids.iter().copied().collect();
        if to_remove.contains(&self.owner_id) {
            return Err(ClashError::InvalidArgument(
                "The owner cannot be removed from the clash".into(),
            ));
        }
        if let Some(missing) = to_remove.iter().find(|id| !self.contains(**id)) {
            return Err(ClashError::InvalidArgument(format!(
                "Player {} is not part of the clash",
                missing
            )));
        }
        if self.players.len() - to_remove.len() < MIN_PLAYERS {
            return Err(ClashError::InvalidArgument(format!(
                "A clash needs at least {} players",
                MIN_PLAYERS
            )));
        }

        self.players.retain(|p| !to_remove.contains(&p.player_id));
        self.refresh_hash();
        self.touch();
        Ok(())
    }

    /// Every non-owner entry has responded and at least two accepted
    pub fn check_start_conditions(&self) -> bool {
        let all_responded = self
            .players
            .iter()
            .filter(|p| p.player_id != self.owner_id)
            .all(|p| p.state.is_terminal());
        all_responded && self.accepted_count() >= MIN_PLAYERS
    }

    /// Move a pending clash to IN_PROGRESS if the start conditions hold.
    /// Returns whether the clash started.
    pub fn try_start(&mut self) -> bool {
        if self.status == ClashStatus::Pending && self.check_start_conditions() {
            self.status = ClashStatus::InProgress;
            self.touch();
            true
        } else {
            false
        }
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.status != ClashStatus::Pending {
            return Err(ClashError::IllegalState(format!(
                "Roster can only change while PENDING (clash is {})",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn refresh_hash(&mut self) {
        self.participant_hash = participant_hash(self.players.iter().map(|p| &p.player_id));
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
