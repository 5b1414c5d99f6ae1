//! The acting player of an operation
//!
//! Every coordinator and gate call receives the caller explicitly. Identity
//! verification happens upstream; by the time an `Actor` exists it is trusted.

use std::collections::BTreeSet;
use uuid::Uuid;

use super::permissions::Capability;
use crate::model::Player;
use crate::types::{ClashError, Result};

/// Identity and capabilities of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub player_id: Uuid,
    pub capabilities: BTreeSet<Capability>,
}

impl Actor {
    pub fn new(player_id: Uuid, capabilities: BTreeSet<Capability>) -> Self {
        Self {
            player_id,
            capabilities,
        }
    }

    /// Regular player with only the USER capability
    pub fn user(player_id: Uuid) -> Self {
        Self::new(player_id, BTreeSet::from([Capability::User]))
    }

    /// Administrator
    pub fn admin(player_id: Uuid) -> Self {
        Self::new(player_id, BTreeSet::from([Capability::User, Capability::Admin]))
    }

    /// Actor for a stored player
    pub fn from_player(player: &Player) -> Self {
        Self::new(player.id, player.capabilities.clone())
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_admin(&self) -> bool {
        self.has(Capability::Admin)
    }
}

/// Require that the actor is exactly `required`.
///
/// A missing actor, a nil required id or a mismatch is `PermissionDenied`.
pub fn check_permission(actor: Option<&Actor>, required: Uuid) -> Result<()> {
    match actor {
        Some(actor) if !required.is_nil() && actor.player_id == required => Ok(()),
        _ => Err(ClashError::PermissionDenied("error.access_denied".into())),
    }
}

/// Require the ADMIN capability
pub fn require_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ClashError::PermissionDenied(
            "Administrative capability required".into(),
        ))
    }
}
