//! Core types for the Lamport clock process model.
//!
//! Every other crate in the workspace builds on these:
//!
//! - [`Rank`]: the stable identity of a process within one run
//! - [`LogicalClock`]: the Lamport counter and its update rules
//! - [`ClockSpeed`]: how many ticks per second a process performs
//! - [`Topology`]: which ranks exist and who accepts/connects whom

mod clock;
mod identifiers;
mod topology;

pub use clock::LogicalClock;
pub use identifiers::{ClockSpeed, Rank};
pub use topology::{Topology, TopologyError};
