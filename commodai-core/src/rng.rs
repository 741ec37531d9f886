//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(stage, key, iteration)`
//! tuple. Sub-seeds are derived via BLAKE3 hashing, independently of thread scheduling
//! order, so per-entity detection gives identical results regardless of thread count.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Default master seed.
pub const DEFAULT_SEED: u64 = 42;

/// Deterministic RNG hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a specific (stage, key, iteration).
    ///
    /// Derivation order does not matter: `sub_seed("detect", "CORN", 0)` is the
    /// same whether or not any other key was derived first.
    pub fn sub_seed(&self, stage: &str, key: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(stage.as_bytes());
        hasher.update(&[0]);
        hasher.update(key.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Create a seeded StdRng from a sub-seed.
    pub fn rng_for(&self, stage: &str, key: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(stage, key, iteration))
    }
}

impl Default for RngHierarchy {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
