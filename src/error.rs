//! Error types for the game server
//!
//! Defines the engine's typed failures, collaborator errors, transport-level
//! application errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::session::SessionState;
use crate::types::PlayerId;

/// Session engine failures
///
/// Every variant is returned with the session record left untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Player id does not resolve in the player directory
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// No session with the given id or join code
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but is no longer in the lobby
    #[error("Session is not accepting new players")]
    SessionNotJoinable,

    /// Privileged operation attempted by someone other than the host
    #[error("Only the host can do this")]
    NotHost,

    /// Operation not allowed in the session's current state
    #[error("Operation not allowed while session is {0}")]
    InvalidState(SessionState),

    /// Requested spy count outside 1..players
    #[error("Invalid number of spies: {requested} for {players} players")]
    InvalidSpyCount { requested: u32, players: usize },

    /// Theme provider failed or timed out
    #[error("Theme generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// No free join code found within the retry cap
    #[error("Join code space exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    /// Optimistic write kept losing to concurrent writers
    #[error("Session update conflicted {attempts} times")]
    Conflict { attempts: u32 },

    /// Backing store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ThemeError> for EngineError {
    fn from(err: ThemeError) -> Self {
        match err {
            ThemeError::Unavailable(reason) => EngineError::GenerationUnavailable(reason),
        }
    }
}

/// Session store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Theme provider errors
#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("{0}")]
    Unavailable(String),
}

/// Player registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Display name already used by another player
    #[error("Name already taken: {0}")]
    NameTaken(String),

    /// Display name empty after trimming
    #[error("Name must not be empty")]
    InvalidName,

    /// No player with the given id
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// Registry storage failure
    #[error("Registry unavailable")]
    Unavailable,
}

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send error message to client).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Request is missing a field or has a malformed value
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Session engine rejected the operation
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Player registry rejected the operation
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client is not draining its queue
    #[error("Channel full")]
    ChannelFull,
}
