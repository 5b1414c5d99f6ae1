//! Configuration for Clashdoor
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

use crate::realtime::DEFAULT_CHANNEL_CAPACITY;
use crate::services::{ClashCoordinatorConfig, DEFAULT_OFFLINE_CLASH_LIMIT};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

/// Clashdoor - clash coordination gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "clashdoor")]
#[command(about = "Invitation, roster and real-time gateway for 2-4 player clashes")]
pub struct Args {
    /// Address to listen on for WebSocket sessions
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (unknown players are registered on connect)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI. Clashes are kept in memory when unset.
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "clashdoor")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// IN_PROGRESS OFFLINE clashes a player may have before new OFFLINE
    /// clashes are refused
    #[arg(long, env = "OFFLINE_CLASH_LIMIT", default_value_t = DEFAULT_OFFLINE_CLASH_LIMIT)]
    pub offline_clash_limit: u64,

    /// Buffered envelopes per destination before slow subscribers lag
    #[arg(long, env = "CHANNEL_CAPACITY", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Seconds between sweeps of idle locks and destinations
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value = "60")]
    pub cleanup_interval_secs: u64,
}

impl Args {
    /// Coordinator settings derived from the CLI
    pub fn coordinator_config(&self) -> ClashCoordinatorConfig {
        ClashCoordinatorConfig {
            offline_clash_limit: self.offline_clash_limit,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err("CHANNEL_CAPACITY must be greater than zero".to_string());
        }
        if self.cleanup_interval_secs == 0 {
            return Err("CLEANUP_INTERVAL_SECS must be greater than zero".to_string());
        }
        if let Some(uri) = &self.mongodb_uri {
            if !uri.starts_with("mongodb://") && !uri.starts_with("mongodb+srv://") {
                return Err("MONGODB_URI must start with mongodb:// or mongodb+srv://".to_string());
            }
            if self.mongodb_db.trim().is_empty() {
                return Err("MONGODB_DB must not be empty".to_string());
            }
        }
        Ok(())
    }
}
