//! Clashdoor - clash coordination gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clashdoor::{
    config::{Args, LogFormat},
    server,
    store::{ClashStore, MemoryClashStore, MongoClashStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("clashdoor={},info", args.log_level).into());
    match args.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Clashdoor - clash coordination gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Offline clash limit: {}", args.offline_clash_limit);
    info!("Channel capacity: {}", args.channel_capacity);
    info!(
        "Clash store: {}",
        if args.mongodb_uri.is_some() { "MongoDB" } else { "memory" }
    );
    info!("======================================");

    let clash_store: Arc<dyn ClashStore> = match &args.mongodb_uri {
        Some(uri) => match MongoClashStore::connect(uri, &args.mongodb_db).await {
            Ok(store) => {
                info!("MongoDB connected successfully");
                Arc::new(store)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, continuing in memory): {}", e);
                    Arc::new(MemoryClashStore::new())
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        },
        None => Arc::new(MemoryClashStore::new()),
    };

    let state = Arc::new(server::AppState::with_clash_store(args, clash_store));
    server::run(state).await?;

    Ok(())
}
