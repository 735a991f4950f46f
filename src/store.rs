//! Session storage
//!
//! The engine treats the store as a keyed blob store with two atomic
//! primitives: compare-and-set of a session record by version, and
//! conditional insert of a join code.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::session::Session;
use crate::types::{JoinCode, SessionId};

/// Durable keyed storage of session records
pub trait SessionStore: Send + Sync {
    /// Load the latest committed snapshot
    fn get(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    /// Store `record` only if the current version equals `expected`
    ///
    /// `expected = None` means the id must not exist yet.
    /// Returns `false` on a version mismatch.
    fn compare_and_set(
        &self,
        id: SessionId,
        expected: Option<u64>,
        record: Session,
    ) -> Result<bool, StoreError>;

    /// Bind a join code to a session if the code is free
    fn reserve_code(&self, code: &JoinCode, id: SessionId) -> Result<bool, StoreError>;

    /// Session currently bound to a join code
    fn resolve_code(&self, code: &JoinCode) -> Result<Option<SessionId>, StoreError>;

    /// Unbind a join code, only if it still points at `id`
    fn release_code(&self, code: &JoinCode, id: SessionId) -> Result<(), StoreError>;
}

/// In-process store backed by hash maps
///
/// Each primitive takes its lock for the duration of one map operation.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    codes: Mutex<HashMap<JoinCode, SessionId>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(&id).cloned())
    }

    fn compare_and_set(
        &self,
        id: SessionId,
        expected: Option<u64>,
        record: Session,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let current = sessions.get(&id).map(|s| s.version);
        if current != expected {
            return Ok(false);
        }
        sessions.insert(id, record);
        Ok(true)
    }

    fn reserve_code(&self, code: &JoinCode, id: SessionId) -> Result<bool, StoreError> {
        let mut codes = self.codes.lock().map_err(poisoned)?;
        if codes.contains_key(code) {
            return Ok(false);
        }
        codes.insert(code.clone(), id);
        Ok(true)
    }

    fn resolve_code(&self, code: &JoinCode) -> Result<Option<SessionId>, StoreError> {
        let codes = self.codes.lock().map_err(poisoned)?;
        Ok(codes.get(code).copied())
    }

    fn release_code(&self, code: &JoinCode, id: SessionId) -> Result<(), StoreError> {
        let mut codes = self.codes.lock().map_err(poisoned)?;
        if codes.get(code) == Some(&id) {
            codes.remove(code);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlayerId;

    fn record() -> Session {
        Session::new(
            SessionId::new(),
            JoinCode::from_string("ABCDEF".to_string()),
            PlayerId::new(),
        )
    }

    #[test]
    fn test_insert_requires_absent() {
        let store = MemorySessionStore::new();
        let session = record();

        assert!(store.compare_and_set(session.id, None, session.clone()).unwrap());
        assert!(!store.compare_and_set(session.id, None, session.clone()).unwrap());
        assert_eq!(store.get(session.id).unwrap(), Some(session));
    }

    #[test]
    fn test_stale_version_rejected() {
        let store = MemorySessionStore::new();
        let session = record();
        store.compare_and_set(session.id, None, session.clone()).unwrap();

        let next = session.joined(PlayerId::new()).unwrap().unwrap();
        assert!(store.compare_and_set(session.id, Some(1), next.clone()).unwrap());

        // Second writer still holding version 1 loses
        let other = session.joined(PlayerId::new()).unwrap().unwrap();
        assert!(!store.compare_and_set(session.id, Some(1), other).unwrap());
        assert_eq!(store.get(session.id).unwrap(), Some(next));
    }

    #[test]
    fn test_code_reservation() {
        let store = MemorySessionStore::new();
        let code = JoinCode::from_string("QWERTY".to_string());
        let first = SessionId::new();
        let second = SessionId::new();

        assert!(store.reserve_code(&code, first).unwrap());
        assert!(!store.reserve_code(&code, second).unwrap());
        assert_eq!(store.resolve_code(&code).unwrap(), Some(first));

        // Releasing on behalf of someone else does nothing
        store.release_code(&code, second).unwrap();
        assert_eq!(store.resolve_code(&code).unwrap(), Some(first));

        store.release_code(&code, first).unwrap();
        assert_eq!(store.resolve_code(&code).unwrap(), None);
        assert!(store.reserve_code(&code, second).unwrap());
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let store = MemorySessionStore::new();
        let session = record();
        store.compare_and_set(session.id, None, session.clone()).unwrap();

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.sessions.write().unwrap();
            panic!("writer died holding the lock");
        }));

        assert!(matches!(store.get(session.id), Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.compare_and_set(session.id, Some(1), session.clone()),
            Err(StoreError::Unavailable(_))
        ));
    }
}
