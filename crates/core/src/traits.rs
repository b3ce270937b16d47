//! Core traits for state machines.

use crate::{Action, Event};
use std::time::Duration;

/// A state machine that processes events.
///
/// The clock engine is implemented as a state machine that is:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event + random seed = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl StateMachine for ProcessStateMachine {
///     fn handle(&mut self, event: Event) -> Vec<Action> {
///         match event {
///             Event::MessageReceived(message) => self.enqueue(message),
///             Event::Tick => self.on_tick(),
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method never blocks or awaits
    /// - **No I/O**: All I/O is performed by the runner via the returned actions
    ///
    /// # Returns
    ///
    /// A list of actions for the runner to execute, in order. Actions may include:
    /// - Sending a wire message to one or more peers
    /// - Recording the outcome of a tick
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the runner at the start of each tick with the wall-clock
    /// time (production) or virtual time (simulation) since the Unix epoch.
    /// It only feeds the tick record and never influences clock ordering.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}
