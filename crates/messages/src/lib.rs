//! Wire messages exchanged between processes.
//!
//! There is exactly one message type: a timestamped note from one process to
//! another. See [`wire`] for the byte layout.

pub mod wire;

pub use wire::{decode, encode, WireError, WireMessage, WIRE_SIZE};
