//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::directory::Player;
use crate::error::{AppError, EngineError, RegistryError};
use crate::session::{Session, SessionState};
use crate::types::{PlayerId, SessionId};

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a player account
    Register { name: String },
    /// Change a player's display name
    Rename { player_id: PlayerId, name: String },
    /// Look up one player
    GetPlayer { player_id: PlayerId },
    /// All registered players, by name
    ListPlayers,
    /// Delete a player account
    RemovePlayer { player_id: PlayerId },
    /// Open a new lobby
    CreateSession { host_id: PlayerId },
    /// Join a lobby by code
    JoinSession { join_code: String, player_id: PlayerId },
    /// Start the round (host only)
    StartSession {
        session_id: SessionId,
        host_id: PlayerId,
        spy_count: Option<u32>,
    },
    /// Next discussion turn (host only)
    AdvanceTurn { session_id: SessionId, host_id: PlayerId },
    /// Fetch the current snapshot
    GetSession { session_id: SessionId },
    /// Ask which side a player is on and which word they hold
    GetRole { session_id: SessionId, player_id: PlayerId },
    /// Reroll the round's theme
    RegenerateTheme { session_id: SessionId },
    /// Close the session (host only)
    EndSession { session_id: SessionId, host_id: PlayerId },
    /// Record an illustration reference (host only)
    AttachImage {
        session_id: SessionId,
        host_id: PlayerId,
        image_ref: String,
    },
    /// Receive events for a session
    Watch { session_id: SessionId },
    /// Stop receiving events for a session
    Unwatch { session_id: SessionId },
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection successful, client ID issued
    Connected { client_id: String },
    /// Player account created or renamed
    Registered { player: Player },
    /// Single player lookup
    Player { player: Player },
    /// Player listing
    Players { players: Vec<Player> },
    /// Player account deleted
    PlayerRemoved { player_id: PlayerId },
    /// Reply to a session operation
    Session { session: SessionView },
    /// A player's private view of the round
    Role {
        session_id: SessionId,
        player_id: PlayerId,
        spy: bool,
        word: Option<String>,
    },
    /// Pushed change on a watched session
    ///
    /// `version` is the snapshot version the event was taken from; clients
    /// drop events older than the last version they have seen.
    Event {
        session_id: SessionId,
        version: u64,
        event: SessionEvent,
    },
    /// Stopped watching a session
    Unwatched { session_id: SessionId },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Client-facing session snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub join_code: String,
    pub host_id: PlayerId,
    pub players: Vec<PlayerId>,
    pub spy_ids: Vec<PlayerId>,
    pub spy_count: Option<u32>,
    pub turn_index: u64,
    pub theme: Option<String>,
    pub theme_summary: Option<String>,
    pub civilian_word: Option<String>,
    pub spy_word: Option<String>,
    pub image_ref: Option<String>,
    pub state: SessionState,
    pub version: u64,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            join_code: session.join_code.to_string(),
            host_id: session.host_id,
            players: session.players.clone(),
            spy_ids: session.spy_ids.clone(),
            spy_count: session.spy_count,
            turn_index: session.turn_index,
            theme: session.theme.clone(),
            theme_summary: session.theme_summary.clone(),
            civilian_word: session.civilian_word.clone(),
            spy_word: session.spy_word.clone(),
            image_ref: session.image_ref.clone(),
            state: session.state,
            version: session.version,
        }
    }
}

/// Change notification published on a session's topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SessionEvent {
    PlayersChanged {
        players: Vec<PlayerId>,
    },
    RoundStarted {
        state: SessionState,
        players: Vec<PlayerId>,
        spy_count: Option<u32>,
    },
    TurnAdvanced {
        turn_index: u64,
    },
    ThemeChanged {
        theme: Option<String>,
        summary: Option<String>,
    },
    RoundEnded {
        state: SessionState,
    },
    ImageChanged {
        image_ref: Option<String>,
    },
}

impl SessionEvent {
    pub fn players_changed(session: &Session) -> Self {
        Self::PlayersChanged {
            players: session.players.clone(),
        }
    }

    pub fn round_started(session: &Session) -> Self {
        Self::RoundStarted {
            state: session.state,
            players: session.players.clone(),
            spy_count: session.spy_count,
        }
    }

    pub fn turn_advanced(session: &Session) -> Self {
        Self::TurnAdvanced {
            turn_index: session.turn_index,
        }
    }

    pub fn theme_changed(session: &Session) -> Self {
        Self::ThemeChanged {
            theme: session.theme.clone(),
            summary: session.theme_summary.clone(),
        }
    }

    pub fn round_ended(session: &Session) -> Self {
        Self::RoundEnded {
            state: session.state,
        }
    }

    pub fn image_changed(session: &Session) -> Self {
        Self::ImageChanged {
            image_ref: session.image_ref.clone(),
        }
    }
}

/// Error codes for ServerMessage::Error
///
/// One code per engine and registry failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message or missing field
    InvalidRequest,
    UnknownPlayer,
    SessionNotFound,
    SessionNotJoinable,
    NotHost,
    InvalidState,
    InvalidSpyCount,
    GenerationUnavailable,
    AllocationExhausted,
    /// Too many concurrent updates; safe to retry
    Conflict,
    NameTaken,
    InvalidName,
    PlayerNotFound,
    /// Anything the client cannot act on
    Internal,
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::UnknownPlayer(_) => ErrorCode::UnknownPlayer,
            EngineError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            EngineError::SessionNotJoinable => ErrorCode::SessionNotJoinable,
            EngineError::NotHost => ErrorCode::NotHost,
            EngineError::InvalidState(_) => ErrorCode::InvalidState,
            EngineError::InvalidSpyCount { .. } => ErrorCode::InvalidSpyCount,
            EngineError::GenerationUnavailable(_) => ErrorCode::GenerationUnavailable,
            EngineError::AllocationExhausted { .. } => ErrorCode::AllocationExhausted,
            EngineError::Conflict { .. } => ErrorCode::Conflict,
            EngineError::Store(_) => ErrorCode::Internal,
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::InvalidRequest(_) | AppError::Json(_) => ErrorCode::InvalidRequest,
            AppError::Engine(e) => ErrorCode::from(e),
            AppError::Registry(RegistryError::NameTaken(_)) => ErrorCode::NameTaken,
            AppError::Registry(RegistryError::InvalidName) => ErrorCode::InvalidName,
            AppError::Registry(RegistryError::PlayerNotFound(_)) => ErrorCode::PlayerNotFound,
            // Fatal errors are not typically converted (connection closes)
            _ => ErrorCode::Internal,
        };
        let message = match code {
            ErrorCode::Internal => "Internal error".to_string(),
            _ => err.to_string(),
        };
        ServerMessage::Error { code, message }
    }
}
