//! Runtime configuration
//!
//! Defaults are compiled in; environment variables override them.
//! Unparsable values are ignored with a warning.

use std::time::Duration;

use tracing::warn;

use crate::allocator::DEFAULT_MAX_ATTEMPTS;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default bound on a single theme provider call
pub const DEFAULT_THEME_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of optimistic write attempts per operation
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 8;

/// Session engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on one `ThemeProvider::generate` call
    pub theme_timeout: Duration,
    /// Join code draws per allocation, and reservations per creation
    pub max_code_attempts: u32,
    /// Read-modify-write cycles before giving up with `Conflict`
    pub max_commit_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            theme_timeout: DEFAULT_THEME_TIMEOUT,
            max_code_attempts: DEFAULT_MAX_ATTEMPTS,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

/// Whole-server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read overrides from the process environment
    ///
    /// - `SPY_ADDR`
    /// - `SPY_THEME_TIMEOUT_MS`
    /// - `SPY_MAX_CODE_ATTEMPTS`
    /// - `SPY_MAX_COMMIT_ATTEMPTS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("SPY_ADDR") {
            config.addr = addr;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "SPY_THEME_TIMEOUT_MS") {
            config.engine.theme_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "SPY_MAX_CODE_ATTEMPTS") {
            config.engine.max_code_attempts = n;
        }
        if let Some(n) = parse_var(&lookup, "SPY_MAX_COMMIT_ATTEMPTS") {
            config.engine.max_commit_attempts = n;
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}
