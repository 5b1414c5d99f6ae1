//! WebSocket server
//!
//! One tokio task per connection. Sessions speak JSON frames: a `connect`
//! handshake, destination subscriptions, chat and commands.

pub mod commands;
pub mod websocket;

pub use commands::{execute, Command};
pub use websocket::{handle_connection, ClientMessage, ServerMessage, Session};

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::realtime::{ChannelTransport, EventDispatcher, PresenceDirectory};
use crate::services::{
    ClashCoordinator, NotificationGenerator, PlayerRegistry, RelationshipGate, StoredGames,
};
use crate::store::{
    ClashStore, MemoryClashStore, MemoryGameStore, MemoryNotificationStore, MemoryPlayerStore,
    MemoryRelationshipStore, PlayerStore,
};
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub presence: Arc<PresenceDirectory>,
    pub transport: Arc<ChannelTransport>,
    pub dispatcher: EventDispatcher,
    pub players: Arc<PlayerRegistry>,
    pub relationships: Arc<RelationshipGate>,
    pub clashes: Arc<ClashCoordinator>,
}

impl AppState {
    /// Everything in memory
    pub fn new(args: Args) -> Self {
        Self::with_clash_store(args, Arc::new(MemoryClashStore::new()))
    }

    /// In-memory state with the given clash backend
    pub fn with_clash_store(args: Args, clash_store: Arc<dyn ClashStore>) -> Self {
        let transport = Arc::new(ChannelTransport::new(args.channel_capacity));
        let dispatcher = EventDispatcher::new(transport.clone());

        let player_store: Arc<dyn PlayerStore> = Arc::new(MemoryPlayerStore::new());
        let players = Arc::new(PlayerRegistry::new(Arc::clone(&player_store)));
        let relationships = Arc::new(RelationshipGate::new(
            Arc::new(MemoryRelationshipStore::new()),
            Arc::clone(&player_store),
        ));
        let clashes = ClashCoordinator::new(
            args.coordinator_config(),
            clash_store,
            Arc::new(MemoryNotificationStore::new()),
            Arc::new(StoredGames::new(Arc::new(MemoryGameStore::new()))),
            NotificationGenerator::new(player_store),
            dispatcher.clone(),
        )
        .with_relationship_gate(Arc::clone(&relationships));

        Self {
            args,
            presence: Arc::new(PresenceDirectory::new()),
            transport,
            dispatcher,
            players,
            relationships,
            clashes: Arc::new(clashes),
        }
    }
}

/// Start the WebSocket server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Clashdoor listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - unknown players are registered on connect");
    }

    spawn_cleanup_task(
        Arc::clone(&state),
        Duration::from_secs(state.args.cleanup_interval_secs),
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(state, stream, addr).await {
                        warn!("Session from {} ended with error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Periodically drop idle per-key locks and destinations without subscribers
pub fn spawn_cleanup_task(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let locks = state.clashes.prune_locks() + state.relationships.prune_locks();
            let destinations = state.transport.prune();
            debug!(locks, destinations, "Cleanup sweep");
        }
    })
}
