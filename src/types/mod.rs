//! Shared types

pub mod error;

pub use error::{ClashError, ErrorResponse, Result};
