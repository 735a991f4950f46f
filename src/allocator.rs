//! Join code allocation
//!
//! Draws fixed-length codes uniformly from an alphabet without the visually
//! confusable `I` and `O`, redrawing while the store already resolves the
//! candidate. Retries are capped so a saturated code space is reported
//! instead of looping forever.

use rand::Rng;

use crate::error::EngineError;
use crate::store::SessionStore;
use crate::types::JoinCode;

/// Uppercase letters minus `I` and `O`
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Number of characters in a join code
pub const CODE_LENGTH: usize = 6;

/// Default retry cap per allocation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 32;

#[derive(Debug, Clone)]
pub struct JoinCodeAllocator {
    alphabet: &'static [u8],
    length: usize,
    max_attempts: u32,
}

impl Default for JoinCodeAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl JoinCodeAllocator {
    /// Standard 6-letter allocator with the given retry cap
    pub fn new(max_attempts: u32) -> Self {
        Self::with_alphabet(CODE_ALPHABET, CODE_LENGTH, max_attempts)
    }

    /// Allocator over a custom code space
    pub fn with_alphabet(alphabet: &'static [u8], length: usize, max_attempts: u32) -> Self {
        Self {
            alphabet,
            length,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw one candidate code
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> JoinCode {
        let code = (0..self.length)
            .map(|_| char::from(self.alphabet[rng.gen_range(0..self.alphabet.len())]))
            .collect();
        JoinCode(code)
    }

    /// Draw a code the store does not currently resolve
    ///
    /// Read-only: the caller still has to reserve the code atomically.
    pub fn allocate<R: Rng + ?Sized>(
        &self,
        store: &dyn SessionStore,
        rng: &mut R,
    ) -> Result<JoinCode, EngineError> {
        for _ in 0..self.max_attempts {
            let candidate = self.draw(rng);
            if store.resolve_code(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(EngineError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use crate::types::SessionId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_code_shape() {
        let allocator = JoinCodeAllocator::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let code = allocator.draw(&mut rng);
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!code.as_str().contains('I') && !code.as_str().contains('O'));
        }
    }

    #[test]
    fn test_allocate_skips_taken_codes() {
        let store = MemorySessionStore::new();
        let allocator = JoinCodeAllocator::with_alphabet(b"AB", 1, 64);
        assert!(store.reserve_code(&JoinCode("A".into()), SessionId::new()).unwrap());

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            assert_eq!(allocator.allocate(&store, &mut rng).unwrap().as_str(), "B");
        }
    }

    #[test]
    fn test_allocate_exhausted() {
        let store = MemorySessionStore::new();
        let allocator = JoinCodeAllocator::with_alphabet(b"A", 1, 5);
        assert!(store.reserve_code(&JoinCode("A".into()), SessionId::new()).unwrap());

        let mut rng = StdRng::seed_from_u64(6);
        assert!(matches!(
            allocator.allocate(&store, &mut rng),
            Err(EngineError::AllocationExhausted { attempts: 5 })
        ));
    }
}
