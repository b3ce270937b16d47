//! Domain-specific identifier types.

use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Process rank.
///
/// Uniquely identifies a process in `[0, world_size)` for the whole run. It is
/// also the `sender_rank` carried on the wire, hence the fixed 16-bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(pub u16);

impl Rank {
    /// Get the raw value.
    pub fn get(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Virtual clock speed of a process, in ticks per second.
///
/// Chosen once at process start and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockSpeed(u32);

impl ClockSpeed {
    /// Slowest allowed speed.
    pub const MIN: u32 = 1;

    /// Fastest allowed speed.
    pub const MAX: u32 = 6;

    /// Create a clock speed, returning `None` outside `[MIN, MAX]`.
    pub fn new(ticks_per_sec: u32) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&ticks_per_sec)
            .then_some(Self(ticks_per_sec))
    }

    /// Draw a speed uniformly from `[MIN, MAX]`.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self(rng.gen_range(Self::MIN..=Self::MAX))
    }

    /// Get the raw ticks-per-second value.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Time between two ticks: `1000 / speed` milliseconds (integer division).
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(u64::from(1000 / self.0))
    }
}

impl fmt::Display for ClockSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
