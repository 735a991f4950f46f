//! Spy Game Server Library
//!
//! Backend for a social deduction party game. Players gather in a session
//! through a short join code, the host starts a round, the server secretly
//! picks the spies, and the host walks the group through discussion turns.
//!
//! # Features
//! - Player registration with unique display names, lookup, listing and removal
//! - Session creation with collision-free 6-letter join codes
//! - Lobby joining (idempotent rejoin)
//! - Round start with uniform random spy assignment, a civilian/spy word
//!   pair and a generated theme
//! - Turn advancement, theme reroll, illustration attach, session end
//! - Push events to every connection watching a session
//!
//! # Architecture
//! - `SessionEngine` owns all state transitions. Each operation is an
//!   optimistic read-modify-write against a `SessionStore`, so concurrent
//!   calls on one session linearize while different sessions never contend.
//! - `HubServer` is an actor that fans events out to watching connections;
//!   connection handlers publish to it only after the engine commits.
//! - Each connection has a `handler` task that translates JSON messages
//!   into engine calls.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use spy_game_server::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(PlayerRegistry::new());
//!     let engine = SessionEngine::new(
//!         Arc::new(MemorySessionStore::new()),
//!         Arc::new(CatalogThemeProvider::locations()),
//!         registry.clone(),
//!         EngineConfig::default(),
//!     );
//!     let (hub, handle) = HubServer::channel(256);
//!     tokio::spawn(hub.run());
//!
//!     let ctx = Arc::new(ServerContext { engine, registry, hub: handle });
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, ctx.clone()));
//!     }
//! }
//! ```

pub mod allocator;
pub mod client;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod session;
pub mod store;
pub mod theme;
pub mod types;

// Re-export main types for convenience
pub use allocator::JoinCodeAllocator;
pub use client::Client;
pub use config::{EngineConfig, ServerConfig};
pub use directory::{Player, PlayerDirectory, PlayerRegistry};
pub use engine::SessionEngine;
pub use error::{AppError, EngineError, RegistryError, SendError, StoreError, ThemeError};
pub use handler::{handle_connection, ServerContext};
pub use hub::{HubCommand, HubHandle, HubServer, NotificationHub};
pub use message::{ClientMessage, ErrorCode, ServerMessage, SessionEvent, SessionView};
pub use session::{Session, SessionState};
pub use store::{MemorySessionStore, SessionStore};
pub use theme::{CatalogThemeProvider, Theme, ThemeProvider, WordPair};
pub use types::{ClientId, JoinCode, PlayerId, SessionId};
