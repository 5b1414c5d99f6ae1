//! Player record
//!
//! One record for anonymous and registered players; the kind tag carries the
//! fields that only apply to one of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::auth::{default_capabilities, Capability};

/// Minimum username length
pub const MIN_USERNAME_LEN: usize = 3;

/// Maximum username length
pub const MAX_USERNAME_LEN: usize = 15;

/// Anonymous or registered player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum PlayerKind {
    /// Temporary player created from a username only
    Anonymous,
    /// Player with credentials held by the identity service
    Registered {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: Uuid,
    pub username: String,
    #[serde(flatten)]
    pub kind: PlayerKind,
    pub capabilities: BTreeSet<Capability>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Player {
    /// Create an anonymous player with default capabilities
    pub fn anonymous(username: impl Into<String>) -> Self {
        Self::with_kind(username.into(), PlayerKind::Anonymous)
    }

    /// Create a registered player with default capabilities
    pub fn registered(username: impl Into<String>, email: Option<String>) -> Self {
        Self::with_kind(username.into(), PlayerKind::Registered { email })
    }

    fn with_kind(username: String, kind: PlayerKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            kind,
            capabilities: default_capabilities(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Use a fixed id (players are identified upstream)
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Grant an extra capability
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.capabilities.contains(&Capability::Admin)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.kind, PlayerKind::Anonymous)
    }
}

/// Check a username against the length bounds
pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_kinds() {
        let anon = Player::anonymous("guest");
        assert!(anon.is_anonymous());
        assert!(!anon.is_admin());

        let admin = Player::registered("root", Some("root@example.org".into()))
            .with_capability(Capability::Admin);
        assert!(!admin.is_anonymous());
        assert!(admin.is_admin());
    }

    #[test]
    fn test_kind_is_flattened() {
        let player = Player::registered("alice", None);
        let json = serde_json::to_value(&player).unwrap();
        assert_eq!(json["kind"], "REGISTERED");
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn test_username_bounds() {
        assert!(!is_valid_username("ab"));
        assert!(is_valid_username("abc"));
        assert!(is_valid_username("fifteen_chars__"));
        assert!(!is_valid_username("sixteen_chars___"));
    }
}
