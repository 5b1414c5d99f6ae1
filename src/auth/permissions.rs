//! Capabilities carried by players
//!
//! A player holds a set of capabilities; operations test for the one they
//! need instead of comparing role hierarchies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Capability granted to a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Capability {
    /// Regular player - may play, invite and manage own relationships
    User,
    /// Administrator - may act on behalf of others and wipe collections
    Admin,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::User => write!(f, "USER"),
            Capability::Admin => write!(f, "ADMIN"),
        }
    }
}

impl Capability {
    /// Human-readable description for logging and role listings
    pub fn description(&self) -> &'static str {
        match self {
            Capability::User => "Regular player",
            Capability::Admin => "Administrator",
        }
    }
}

/// Capabilities every newly registered player receives
pub fn default_capabilities() -> BTreeSet<Capability> {
    BTreeSet::from([Capability::User])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capabilities() {
        let caps = default_capabilities();
        assert!(caps.contains(&Capability::User));
        assert!(!caps.contains(&Capability::Admin));
    }

    #[test]
    fn test_capability_serialization() {
        let json = serde_json::to_string(&Capability::Admin).unwrap();
        assert_eq!(json, "\"ADMIN\"");
        let back: Capability = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(back, Capability::User);
    }
}
