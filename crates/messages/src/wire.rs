//! Message encoding and decoding for peer channels.
//!
//! # Wire Format
//!
//! Every message is one fixed-width record, little-endian, no padding:
//!
//! ```text
//! [sender_rank: u16][timestamp: u64]
//!  0            1   2            9
//! ```
//!
//! There is no length prefix and no checksum. A receiver always reads exactly
//! [`WIRE_SIZE`] bytes per message, so every process in a run must agree on
//! this layout.

use bytes::{Buf, BufMut};
use lamport_types::{LogicalClock, Rank};
use thiserror::Error;

/// Size in bytes of one encoded message.
pub const WIRE_SIZE: usize = 2 + 8;

/// Errors that can occur during message decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Invalid message length: expected 10 bytes, got {0}")]
    InvalidLength(usize),
}

/// A timestamped message from one process to another.
///
/// Built once per send and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireMessage {
    /// Rank of the sending process.
    pub sender: Rank,
    /// Sender's logical clock when the message was built, before the sender's
    /// own post-send increment.
    pub timestamp: u64,
}

impl WireMessage {
    /// Create a message stamped with the sender's current clock.
    pub fn new(sender: Rank, clock: LogicalClock) -> Self {
        Self {
            sender,
            timestamp: clock.value(),
        }
    }
}

/// Encode a message to its fixed-width wire form.
pub fn encode(message: &WireMessage) -> [u8; WIRE_SIZE] {
    let mut out = [0u8; WIRE_SIZE];
    let mut buf = &mut out[..];
    buf.put_u16_le(message.sender.0);
    buf.put_u64_le(message.timestamp);
    out
}

/// Decode a message from exactly [`WIRE_SIZE`] bytes.
pub fn decode(data: &[u8]) -> Result<WireMessage, WireError> {
    if data.len() != WIRE_SIZE {
        return Err(WireError::InvalidLength(data.len()));
    }

    let mut buf = data;
    let sender = Rank(buf.get_u16_le());
    let timestamp = buf.get_u64_le();
    Ok(WireMessage { sender, timestamp })
}
