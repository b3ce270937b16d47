//! Inbound events for the clock engine.

use lamport_messages::WireMessage;

/// Events delivered to the engine by its runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A message was read off a peer channel during the drain phase.
    ///
    /// Only appended to the inbound queue; the clock does not move until the
    /// message is popped by a later [`Event::Tick`].
    MessageReceived(WireMessage),

    /// Decision phase of a tick. Produces exactly one clock event.
    Tick,
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::MessageReceived(_) => "MessageReceived",
            Event::Tick => "Tick",
        }
    }
}
