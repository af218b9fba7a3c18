//! Population-scaled admission difficulty.
//!
//! As a server fills up, new publisher keys must be numerically smaller to be
//! admitted: `factor = (boards / 10_000_000)^4` and
//! `threshold = (2^256 - 1) * (1 - factor)`. A key is admitted when its
//! big-endian value is strictly below the threshold. Keys that already have a
//! board are never re-checked.

use crate::identity::Publisher;
use num_bigint::BigUint;
use num_traits::{FromPrimitive, Zero};

/// Board count at which the factor reaches 1 and no new key is admitted
pub const MAX_NUM_BOARDS: usize = 10_000_000;

/// `(num_boards / MAX_NUM_BOARDS)^4`
pub fn difficulty_factor(num_boards: usize) -> f64 {
    (num_boards as f64 / MAX_NUM_BOARDS as f64).powf(4.0)
}

/// `(2^256 - 1) * (1 - factor)`, evaluated at double precision.
///
/// At double precision `2^256 - 1` rounds to `2^256`, so a factor of 0 yields
/// one more than the largest key and admits everything.
pub fn key_threshold(factor: f64) -> BigUint {
    let scaled = (1.0 - factor.clamp(0.0, 1.0)) * 2f64.powi(256);
    BigUint::from_f64(scaled).unwrap_or_else(BigUint::zero)
}

/// Admission gate applied to keys that have no board yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct DifficultyGate {
    /// When false every key is admitted
    pub enabled: bool,
    /// Added to the live board count, for servers that want to start strict
    pub seed_boards: usize,
}

impl DifficultyGate {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled(seed_boards: usize) -> Self {
        Self {
            enabled: true,
            seed_boards,
        }
    }

    /// Current threshold for a store holding `live_boards` boards.
    pub fn threshold(&self, live_boards: usize) -> BigUint {
        key_threshold(difficulty_factor(
            live_boards.saturating_add(self.seed_boards),
        ))
    }

    /// Whether a new key may register given the current board count.
    pub fn admits(&self, publisher: &Publisher, live_boards: usize) -> bool {
        !self.enabled || publisher.strength() < self.threshold(live_boards)
    }
}
