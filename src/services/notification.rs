//! Clash invitation notices

use std::sync::Arc;
use uuid::Uuid;

use crate::model::{Clash, Notification, NotificationType, Player};
use crate::store::PlayerStore;
use crate::types::{ClashError, Result};

/// Link a notification points at
pub fn clash_link(clash_id: Uuid) -> String {
    format!("/clashes/{}", clash_id)
}

/// One invitation per participant other than the owner. Only players that
/// exist are passed in, so unknown ids simply get no notice.
pub fn clash_invitations(
    clash: &Clash,
    participants: &[Player],
    owner: &Player,
) -> Vec<Notification> {
    participants
        .iter()
        .filter(|player| player.id != owner.id)
        .map(|player| {
            Notification::new(
                player.id,
                format!("Clash invitation from {}", owner.username),
                clash_link(clash.id),
                NotificationType::ClashInvitation,
            )
        })
        .collect()
}

/// Resolves players and builds invitations. Persisting them is up to the
/// caller.
#[derive(Clone)]
pub struct NotificationGenerator {
    players: Arc<dyn PlayerStore>,
}

impl NotificationGenerator {
    pub fn new(players: Arc<dyn PlayerStore>) -> Self {
        Self { players }
    }

    /// Look up a player that must exist
    pub async fn require_player(&self, player_id: Uuid) -> Result<Player> {
        self.players
            .find_by_id(player_id)
            .await?
            .ok_or_else(|| ClashError::NotFound(format!("Player {}", player_id)))
    }

    /// Invitations for `participant_ids`, sent on behalf of the clash owner
    pub async fn invitations(
        &self,
        clash: &Clash,
        participant_ids: &[Uuid],
    ) -> Result<Vec<Notification>> {
        let owner = self.require_player(clash.owner_id).await?;
        let participants = self.players.find_all_by_ids(participant_ids).await?;
        Ok(clash_invitations(clash, &participants, &owner))
    }
}
