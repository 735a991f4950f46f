//! Spy Game Server - Entry Point
//!
//! Wires the session engine, player registry and notification hub together,
//! then accepts WebSocket connections.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spy_game_server::{
    handle_connection, CatalogThemeProvider, HubServer, MemorySessionStore, PlayerRegistry,
    ServerConfig, ServerContext, SessionEngine,
};

/// Channel buffer size for hub commands
const HUB_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=spy_game_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("spy_game_server=info")),
        )
        .init();

    let mut config = ServerConfig::from_env();

    // Bind address from command line wins over the environment
    if let Some(addr) = env::args().nth(1) {
        config.addr = addr;
    }

    let registry = Arc::new(PlayerRegistry::new());
    let engine = SessionEngine::new(
        Arc::new(MemorySessionStore::new()),
        Arc::new(CatalogThemeProvider::locations()),
        registry.clone(),
        config.engine.clone(),
    );

    let (hub, hub_handle) = HubServer::channel(HUB_BUFFER_SIZE);
    tokio::spawn(hub.run());

    info!("NotificationHub actor started");

    let ctx = Arc::new(ServerContext {
        engine,
        registry,
        hub: hub_handle,
    });

    let listener = TcpListener::bind(&config.addr).await?;
    info!(
        "Spy Game Server listening on {} (theme timeout {:?})",
        config.addr, config.engine.theme_timeout
    );

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let ctx = ctx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
