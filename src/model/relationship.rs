//! Player relationship edges
//!
//! An edge is keyed by the ordered (requester, target) pair, but at most one
//! edge may exist per unordered pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationshipType {
    Friend,
    Block,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Friend => "FRIEND",
            RelationshipType::Block => "BLOCK",
        }
    }
}

/// Unordered pair of player ids, smallest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(pub Uuid, pub Uuid);

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRelationship {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub target_id: Uuid,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlayerRelationship {
    /// New edge. BLOCK edges are active immediately, FRIEND edges wait for
    /// the target to accept.
    pub fn new(requester_id: Uuid, target_id: Uuid, relationship_type: RelationshipType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester_id,
            target_id,
            relationship_type,
            active: relationship_type == RelationshipType::Block,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pair(&self) -> PairKey {
        PairKey::new(self.requester_id, self.target_id)
    }

    pub fn involves(&self, player_id: Uuid) -> bool {
        self.requester_id == player_id || self.target_id == player_id
    }

    pub fn is_block(&self) -> bool {
        self.relationship_type == RelationshipType::Block
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.updated_at = Utc::now();
    }
}
