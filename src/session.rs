//! Session record and state transitions
//!
//! A `Session` is an immutable snapshot: every transition returns a new
//! record with `version + 1` and leaves the original untouched. The engine
//! publishes the new snapshot only if the stored version is still the one
//! it read.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::theme::{Theme, WordPair};
use crate::types::{JoinCode, PlayerId, SessionId};

/// Lifecycle state of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Lobby: players may join
    Waiting,
    /// Round in progress
    Running,
    /// Terminal
    Finished,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Waiting => "WAITING",
            SessionState::Running => "RUNNING",
            SessionState::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

/// One game round from lobby through active play
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub join_code: JoinCode,
    /// Creator; sole authority for privileged transitions
    pub host_id: PlayerId,
    /// Join order, host first, no duplicates
    pub players: Vec<PlayerId>,
    pub spy_ids: Vec<PlayerId>,
    pub spy_count: Option<u32>,
    pub turn_index: u64,
    pub theme: Option<String>,
    pub theme_summary: Option<String>,
    /// Word shown to civilians; set when the round starts
    pub civilian_word: Option<String>,
    /// Word shown to spies
    pub spy_word: Option<String>,
    pub image_ref: Option<String>,
    pub state: SessionState,
    /// Optimistic concurrency token, bumped on every committed change
    pub version: u64,
}

impl Session {
    /// Create a new lobby with the host as its only player
    pub fn new(id: SessionId, join_code: JoinCode, host_id: PlayerId) -> Self {
        Self {
            id,
            join_code,
            host_id,
            players: vec![host_id],
            spy_ids: Vec::new(),
            spy_count: None,
            turn_index: 0,
            theme: None,
            theme_summary: None,
            civilian_word: None,
            spy_word: None,
            image_ref: None,
            state: SessionState::Waiting,
            version: 1,
        }
    }

    /// Check if a player is in this session
    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.players.contains(&player_id)
    }

    pub fn is_spy(&self, player_id: PlayerId) -> bool {
        self.spy_ids.contains(&player_id)
    }

    /// The word a player sees this round
    ///
    /// `None` before the round starts or for non-members.
    pub fn word_for(&self, player_id: PlayerId) -> Option<&str> {
        if !self.contains(player_id) {
            return None;
        }
        if self.is_spy(player_id) {
            self.spy_word.as_deref()
        } else {
            self.civilian_word.as_deref()
        }
    }

    /// Whether the join code should still resolve to this session
    pub fn is_resolvable(&self) -> bool {
        self.state != SessionState::Finished
    }

    /// Add a player to the lobby
    ///
    /// Returns `Ok(None)` when the player is already a member (idempotent rejoin).
    pub fn joined(&self, player_id: PlayerId) -> Result<Option<Session>, EngineError> {
        if self.state != SessionState::Waiting {
            return Err(EngineError::SessionNotJoinable);
        }
        if self.contains(player_id) {
            return Ok(None);
        }

        let mut next = self.successor();
        next.players.push(player_id);
        Ok(Some(next))
    }

    /// Validate a start request without touching the record
    pub fn check_startable(&self, host_id: PlayerId, spy_count: u32) -> Result<(), EngineError> {
        self.require_host(host_id)?;
        if self.state != SessionState::Waiting {
            return Err(EngineError::InvalidState(self.state));
        }
        let players = self.players.len();
        if spy_count < 1 || spy_count as usize >= players {
            return Err(EngineError::InvalidSpyCount {
                requested: spy_count,
                players,
            });
        }
        Ok(())
    }

    /// Start the round: assign spies, words and the theme, reset the turn counter
    pub fn started<R: Rng + ?Sized>(
        &self,
        host_id: PlayerId,
        spy_count: u32,
        theme: Theme,
        rng: &mut R,
    ) -> Result<Session, EngineError> {
        self.check_startable(host_id, spy_count)?;

        let mut next = self.successor();
        next.spy_ids = pick_spies(&self.players, spy_count as usize, &mut *rng);
        next.spy_count = Some(spy_count);
        let words = WordPair::pick(rng);
        next.civilian_word = Some(words.civilian);
        next.spy_word = Some(words.spy);
        next.theme = Some(theme.name);
        next.theme_summary = Some(theme.summary);
        next.turn_index = 0;
        next.state = SessionState::Running;
        Ok(next)
    }

    /// Move to the next discussion turn
    pub fn advanced(&self, host_id: PlayerId) -> Result<Session, EngineError> {
        self.require_host(host_id)?;
        if self.state != SessionState::Running {
            return Err(EngineError::InvalidState(self.state));
        }

        let mut next = self.successor();
        next.turn_index += 1;
        Ok(next)
    }

    /// Replace the theme, in any state
    pub fn rethemed(&self, theme: Theme) -> Session {
        let mut next = self.successor();
        next.theme = Some(theme.name);
        next.theme_summary = Some(theme.summary);
        next
    }

    /// Close the session for good
    pub fn ended(&self, host_id: PlayerId) -> Result<Session, EngineError> {
        self.require_host(host_id)?;
        if self.state == SessionState::Finished {
            return Err(EngineError::InvalidState(self.state));
        }

        let mut next = self.successor();
        next.state = SessionState::Finished;
        Ok(next)
    }

    /// Record a reference to an externally generated illustration
    pub fn with_image(&self, host_id: PlayerId, image_ref: String) -> Result<Session, EngineError> {
        self.require_host(host_id)?;
        if self.state == SessionState::Finished {
            return Err(EngineError::InvalidState(self.state));
        }

        let mut next = self.successor();
        next.image_ref = Some(image_ref);
        Ok(next)
    }

    /// First broken invariant, if any
    pub fn invariant_violation(&self) -> Option<&'static str> {
        let mut seen = std::collections::HashSet::new();
        if !self.players.iter().all(|p| seen.insert(*p)) {
            return Some("duplicate player");
        }
        if !self.contains(self.host_id) {
            return Some("host missing from players");
        }
        match self.state {
            SessionState::Waiting => {
                if !self.spy_ids.is_empty()
                    || self.spy_count.is_some()
                    || self.turn_index != 0
                    || self.civilian_word.is_some()
                    || self.spy_word.is_some()
                {
                    return Some("round fields set in lobby");
                }
            }
            SessionState::Running | SessionState::Finished => {
                if let Some(k) = self.spy_count {
                    if k < 1 || k as usize >= self.players.len() || self.spy_ids.len() != k as usize {
                        return Some("spy count out of range");
                    }
                    if !self.spy_ids.iter().all(|s| self.contains(*s)) {
                        return Some("spy is not a player");
                    }
                }
            }
        }
        if self.state == SessionState::Running && self.theme.is_none() {
            return Some("running without a theme");
        }
        if self.state == SessionState::Running
            && (self.civilian_word.is_none() || self.spy_word.is_none())
        {
            return Some("running without words");
        }
        None
    }

    fn require_host(&self, player_id: PlayerId) -> Result<(), EngineError> {
        if self.host_id != player_id {
            return Err(EngineError::NotHost);
        }
        Ok(())
    }

    fn successor(&self) -> Session {
        let mut next = self.clone();
        next.version += 1;
        next
    }
}

/// Pick `count` distinct players uniformly at random
///
/// Fisher-Yates shuffle of a copy, then the first `count` entries.
pub fn pick_spies<R: Rng + ?Sized>(players: &[PlayerId], count: usize, rng: &mut R) -> Vec<PlayerId> {
    let mut order = players.to_vec();
    order.shuffle(rng);
    order.truncate(count);
    order
}
