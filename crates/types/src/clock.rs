//! Lamport logical clock.

use std::fmt;

/// A Lamport logical clock value.
///
/// Starts at zero and only ever moves forward. Every local event (internal or
/// send) advances it by one via [`tick`](Self::tick); a receive first catches
/// up with the sender via [`observe`](Self::observe).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalClock(pub u64);

impl LogicalClock {
    /// Initial clock value.
    pub const ZERO: Self = LogicalClock(0);

    /// Get the raw value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Advance by one for an internal or send event.
    pub fn tick(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// Apply the receive rule for a message stamped `timestamp`.
    ///
    /// The clock becomes `max(current, timestamp + 1) + 1`: first raised past
    /// the sender's send event, then advanced for the receive event itself.
    pub fn observe(&mut self, timestamp: u64) {
        self.0 = self.0.max(timestamp.saturating_add(1));
        self.tick();
    }
}

impl fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
