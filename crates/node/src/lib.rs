//! Clock engine state machine.
//!
//! This crate holds the per-process heart of the model: the logical clock,
//! the inbound message queue and the per-tick decision algorithm.
//!
//! # Architecture
//!
//! The engine processes events synchronously:
//!
//! - `Event::MessageReceived` → append to the inbound queue
//! - `Event::Tick` → consume one queued message, or draw a random action
//!   (send to one peer, the other peer, every peer, or an internal event)
//!
//! All I/O is performed by the runner via returned `Action`s.

mod state;

pub use state::ProcessStateMachine;
