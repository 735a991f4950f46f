//! Session engine
//!
//! Owns every session transition. Each operation works on exactly one
//! session as an optimistic read-modify-write: load version N, compute
//! version N+1 from the snapshot, publish it only if the store still holds
//! N, otherwise reload and retry a bounded number of times.
//!
//! Slow collaborator calls (theme generation) happen before the cycle
//! starts, never inside it. The engine does not notify anyone; callers
//! publish events after a successful return.

use std::sync::Arc;

use rand::Rng;
use tokio::time::timeout;

use crate::allocator::JoinCodeAllocator;
use crate::config::EngineConfig;
use crate::directory::PlayerDirectory;
use crate::error::EngineError;
use crate::session::{Session, SessionState};
use crate::store::SessionStore;
use crate::theme::{Theme, ThemeProvider};
use crate::types::{JoinCode, PlayerId, SessionId};

pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    themes: Arc<dyn ThemeProvider>,
    players: Arc<dyn PlayerDirectory>,
    allocator: JoinCodeAllocator,
    config: EngineConfig,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        themes: Arc<dyn ThemeProvider>,
        players: Arc<dyn PlayerDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            themes,
            players,
            allocator: JoinCodeAllocator::new(config.max_code_attempts),
            config,
        }
    }

    /// Replace the join code allocator
    pub fn with_allocator(mut self, allocator: JoinCodeAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Open a new lobby hosted by `host_id`
    pub fn create_session<R: Rng + ?Sized>(
        &self,
        host_id: PlayerId,
        rng: &mut R,
    ) -> Result<Session, EngineError> {
        if !self.players.exists(host_id)? {
            return Err(EngineError::UnknownPlayer(host_id));
        }

        let id = SessionId::new();
        let code = self.reserve_code(id, rng)?;
        let session = Session::new(id, code.clone(), host_id);

        match self.store.compare_and_set(id, None, session.clone()) {
            Ok(true) => Ok(session),
            Ok(false) => {
                let _ = self.store.release_code(&code, id);
                Err(EngineError::Conflict { attempts: 1 })
            }
            Err(e) => {
                let _ = self.store.release_code(&code, id);
                Err(e.into())
            }
        }
    }

    /// Add a player to a lobby by join code
    pub fn join_session(
        &self,
        join_code: &JoinCode,
        player_id: PlayerId,
    ) -> Result<Session, EngineError> {
        let id = self
            .store
            .resolve_code(join_code)?
            .ok_or_else(|| EngineError::SessionNotFound(join_code.to_string()))?;

        self.commit(id, |current| {
            if current.state != SessionState::Waiting {
                return Err(EngineError::SessionNotJoinable);
            }
            if !self.players.exists(player_id)? {
                return Err(EngineError::UnknownPlayer(player_id));
            }
            current.joined(player_id)
        })
    }

    /// Start the round: pick a theme, assign spies, move to RUNNING
    pub async fn start_session<R: Rng + ?Sized + Send>(
        &self,
        session_id: SessionId,
        host_id: PlayerId,
        spy_count: u32,
        rng: &mut R,
    ) -> Result<Session, EngineError> {
        // Reject early so a doomed call never reaches the provider
        self.load(session_id)?.check_startable(host_id, spy_count)?;

        let theme = self.generate_theme().await?;

        self.commit(session_id, |current| {
            current
                .started(host_id, spy_count, theme.clone(), &mut *rng)
                .map(Some)
        })
    }

    /// Move a running round to its next turn
    pub fn advance_turn(
        &self,
        session_id: SessionId,
        host_id: PlayerId,
    ) -> Result<Session, EngineError> {
        self.commit(session_id, |current| current.advanced(host_id).map(Some))
    }

    pub fn get_session(&self, session_id: SessionId) -> Result<Session, EngineError> {
        self.load(session_id)
    }

    /// Reroll the theme, whatever the state
    pub async fn regenerate_theme(&self, session_id: SessionId) -> Result<Session, EngineError> {
        self.load(session_id)?;

        let theme = self.generate_theme().await?;

        self.commit(session_id, |current| Ok(Some(current.rethemed(theme.clone()))))
    }

    /// Finish the session and free its join code
    pub fn end_session(
        &self,
        session_id: SessionId,
        host_id: PlayerId,
    ) -> Result<Session, EngineError> {
        let finished = self.commit(session_id, |current| current.ended(host_id).map(Some))?;

        // On failure the code stays reserved and allocation skips it
        let _ = self.store.release_code(&finished.join_code, finished.id);

        Ok(finished)
    }

    /// Record an externally generated illustration
    pub fn attach_image(
        &self,
        session_id: SessionId,
        host_id: PlayerId,
        image_ref: String,
    ) -> Result<Session, EngineError> {
        self.commit(session_id, |current| {
            current.with_image(host_id, image_ref.clone()).map(Some)
        })
    }

    fn load(&self, session_id: SessionId) -> Result<Session, EngineError> {
        self.store
            .get(session_id)?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Optimistic read-modify-write of one session
    ///
    /// `change` returns `Ok(None)` when the snapshot needs no update; the
    /// current record is returned as-is and nothing is written.
    fn commit<F>(&self, session_id: SessionId, mut change: F) -> Result<Session, EngineError>
    where
        F: FnMut(&Session) -> Result<Option<Session>, EngineError>,
    {
        let attempts = self.config.max_commit_attempts.max(1);
        for _ in 0..attempts {
            let current = self.load(session_id)?;
            let Some(next) = change(&current)? else {
                return Ok(current);
            };
            debug_assert_eq!(next.invariant_violation(), None);

            if self
                .store
                .compare_and_set(session_id, Some(current.version), next.clone())?
            {
                return Ok(next);
            }
        }
        Err(EngineError::Conflict { attempts })
    }

    /// Allocate and reserve a join code for `id`
    ///
    /// Reservation is the conditional insert; losing it to a concurrent
    /// creation sends us back to the allocator.
    fn reserve_code<R: Rng + ?Sized>(
        &self,
        id: SessionId,
        rng: &mut R,
    ) -> Result<JoinCode, EngineError> {
        let attempts = self.allocator.max_attempts();
        for _ in 0..attempts {
            let code = self.allocator.allocate(self.store.as_ref(), &mut *rng)?;
            if self.store.reserve_code(&code, id)? {
                return Ok(code);
            }
        }
        Err(EngineError::AllocationExhausted { attempts })
    }

    async fn generate_theme(&self) -> Result<Theme, EngineError> {
        match timeout(self.config.theme_timeout, self.themes.generate()).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::GenerationUnavailable(format!(
                "theme provider timed out after {:?}",
                self.config.theme_timeout
            ))),
        }
    }
}
