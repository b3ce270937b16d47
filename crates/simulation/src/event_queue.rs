//! Ordering key for scheduled ticks.

use lamport_types::Rank;
use std::time::Duration;

/// Key of a scheduled tick.
///
/// Ticks are processed in `(time, rank, sequence)` order, so two processes
/// ticking at the same virtual instant always run lowest rank first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// Virtual time of the tick.
    pub time: Duration,
    /// Process that ticks.
    pub rank: Rank,
    /// Insertion counter, breaks any remaining tie.
    pub sequence: u64,
}
