//! Actors and capabilities
//!
//! Provides:
//! - Capability set carried by each player
//! - Explicit `Actor` threaded through every operation
//! - Guards for owner-only and admin-only operations

pub mod actor;
pub mod permissions;

pub use actor::{check_permission, require_admin, Actor};
pub use permissions::{default_capabilities, Capability};
