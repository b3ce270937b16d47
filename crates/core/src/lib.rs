//! Core types for the Lamport clock engine.
//!
//! The engine is written as a synchronous state machine. Runners feed it
//! [`Event`]s and carry out the [`Action`]s it returns:
//!
//! ```text
//! runner ── Event::MessageReceived ──▶ state machine (enqueue)
//! runner ── Event::Tick ─────────────▶ state machine ──▶ [Send.., Record]
//! ```
//!
//! Keeping all I/O in the runner lets the same engine run inside the
//! deterministic simulation and the production process.

mod action;
mod event;
mod record;
mod traits;

pub use action::{Action, SendTarget};
pub use event::Event;
pub use record::{ParseRecordError, TickEvent, TickRecord};
pub use traits::StateMachine;
