//! Round themes
//!
//! The engine consumes themes opaquely through `ThemeProvider`. The bundled
//! `CatalogThemeProvider` picks a location from a fixed catalog.
//!
//! Each round also gets a word pair: civilians share one word, spies get a
//! related but broader one.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ThemeError;

/// Name shown when the catalog has nothing to offer
pub const FALLBACK_NAME: &str = "Unknown Location";

/// Summary paired with the fallback name
pub const FALLBACK_SUMMARY: &str = "A location for discussion in the game.";

/// Subject of a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub summary: String,
}

impl Theme {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
        }
    }
}

/// Civilian word and the spy's near-miss counterpart
pub const WORD_PAIRS: &[(&str, &str)] = &[
    ("cat", "animal"),
    ("dog", "pet"),
    ("house", "home"),
    ("car", "vehicle"),
    ("tree", "plant"),
    ("book", "object"),
    ("phone", "device"),
    ("computer", "machine"),
    ("table", "furniture"),
    ("chair", "seat"),
];

/// Words handed out for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordPair {
    pub civilian: String,
    pub spy: String,
}

impl WordPair {
    /// Uniform pick from `WORD_PAIRS`
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let (civilian, spy) = WORD_PAIRS[rng.gen_range(0..WORD_PAIRS.len())];
        Self {
            civilian: civilian.to_string(),
            spy: spy.to_string(),
        }
    }
}

/// Source of round themes
///
/// Implementations may be slow (network calls); the engine bounds each call
/// with a timeout.
#[async_trait]
pub trait ThemeProvider: Send + Sync {
    async fn generate(&self) -> Result<Theme, ThemeError>;
}

/// Picks a random location from a catalog
pub struct CatalogThemeProvider {
    locations: Vec<String>,
    rng: Mutex<StdRng>,
}

impl CatalogThemeProvider {
    pub fn new(locations: Vec<String>) -> Self {
        Self {
            locations,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic picks, for tests
    pub fn with_seed(locations: Vec<String>, seed: u64) -> Self {
        Self {
            locations,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Catalog of well-known places
    pub fn locations() -> Self {
        let locations = [
            "Airport",
            "Bank",
            "Beach",
            "Casino",
            "Cathedral",
            "Circus Tent",
            "Embassy",
            "Hospital",
            "Hotel",
            "Movie Studio",
            "Ocean Liner",
            "Passenger Train",
            "Pirate Ship",
            "Polar Station",
            "Police Station",
            "Restaurant",
            "School",
            "Space Station",
            "Submarine",
            "Supermarket",
        ];
        Self::new(locations.iter().map(|l| l.to_string()).collect())
    }

    fn summary_for(name: &str) -> String {
        format!(
            "{name}: a recognizable place everyone can talk about. \
             Describe it without naming it, and watch who seems lost."
        )
    }
}

#[async_trait]
impl ThemeProvider for CatalogThemeProvider {
    async fn generate(&self) -> Result<Theme, ThemeError> {
        let picked = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| ThemeError::Unavailable("theme catalog lock poisoned".to_string()))?;
            self.locations.choose(&mut *rng).cloned()
        };

        Ok(match picked {
            Some(name) => {
                let summary = Self::summary_for(&name);
                Theme::new(name, summary)
            }
            None => Theme::new(FALLBACK_NAME, FALLBACK_SUMMARY),
        })
    }
}
