//! Player accounts
//!
//! The engine only asks whether a player id exists. `PlayerRegistry` is the
//! in-process account store behind that question: display names are unique
//! and player records are never touched by session operations.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, StoreError};
use crate::types::PlayerId;

/// Existence check consumed by the session engine
///
/// A backend failure is an error, never a "no".
pub trait PlayerDirectory: Send + Sync {
    fn exists(&self, player_id: PlayerId) -> Result<bool, StoreError>;
}

/// A registered player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
}

/// In-memory account store with unique display names
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: RwLock<HashMap<PlayerId, Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new player under a unique name
    pub fn register(&self, name: &str) -> Result<Player, RegistryError> {
        let name = normalize(name)?;
        let mut players = self.players.write().map_err(|_| RegistryError::Unavailable)?;
        if players.values().any(|p| p.name == name) {
            return Err(RegistryError::NameTaken(name));
        }

        let player = Player {
            id: PlayerId::new(),
            name,
        };
        players.insert(player.id, player.clone());
        Ok(player)
    }

    /// Change a player's display name
    ///
    /// Renaming to the current name is allowed.
    pub fn rename(&self, id: PlayerId, name: &str) -> Result<Player, RegistryError> {
        let name = normalize(name)?;
        let mut players = self.players.write().map_err(|_| RegistryError::Unavailable)?;
        if players.values().any(|p| p.name == name && p.id != id) {
            return Err(RegistryError::NameTaken(name));
        }

        let player = players.get_mut(&id).ok_or(RegistryError::PlayerNotFound(id))?;
        player.name = name;
        Ok(player.clone())
    }

    pub fn remove(&self, id: PlayerId) -> Result<Player, RegistryError> {
        let mut players = self.players.write().map_err(|_| RegistryError::Unavailable)?;
        players.remove(&id).ok_or(RegistryError::PlayerNotFound(id))
    }

    pub fn get(&self, id: PlayerId) -> Result<Player, RegistryError> {
        let players = self.players.read().map_err(|_| RegistryError::Unavailable)?;
        players.get(&id).cloned().ok_or(RegistryError::PlayerNotFound(id))
    }

    /// All players, sorted by name
    pub fn list(&self) -> Result<Vec<Player>, RegistryError> {
        let players = self.players.read().map_err(|_| RegistryError::Unavailable)?;
        let mut all: Vec<Player> = players.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

impl PlayerDirectory for PlayerRegistry {
    fn exists(&self, player_id: PlayerId) -> Result<bool, StoreError> {
        let players = self
            .players
            .read()
            .map_err(|_| StoreError::Unavailable("player registry lock poisoned".to_string()))?;
        Ok(players.contains_key(&player_id))
    }
}

fn normalize(name: &str) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::InvalidName);
    }
    Ok(name.to_string())
}
