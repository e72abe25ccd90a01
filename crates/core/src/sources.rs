//! Injected sources of time and randomness.
//!
//! Services never read the wall clock or seed an RNG on their own; they ask a
//! `Clock` or a `RandomSource`, so tests can pin both.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }
}

/// Where per-operation randomness comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RandomSource {
    /// Fresh OS entropy for every operation.
    #[default]
    Os,
    /// The same seed for every operation; draws within one operation still differ.
    Seeded(u64),
}

impl RandomSource {
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::Seeded(seed)
    }

    /// A generator for one operation.
    #[must_use]
    pub fn rng(&self) -> StdRng {
        match self {
            RandomSource::Os => StdRng::from_os_rng(),
            RandomSource::Seeded(seed) => StdRng::seed_from_u64(*seed),
        }
    }
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}
