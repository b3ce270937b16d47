//! Per-tick trace records.
//!
//! # Line Format
//!
//! One line per tick, written and flushed before the process sleeps:
//!
//! ```text
//! <wall_clock_ms>,<logical_clock>,<rank>: <event description>
//! ```
//!
//! `logical_clock` is the value at the start of the tick, before the tick's
//! event is applied. Records parse back with [`str::parse`] so traces can be
//! analysed offline.

use lamport_types::{LogicalClock, Rank};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a trace line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRecordError {
    #[error("Missing ': ' separator in {0:?}")]
    MissingSeparator(String),

    #[error("Malformed record header {0:?}")]
    MalformedHeader(String),

    #[error("Unknown event description {0:?}")]
    UnknownEvent(String),
}

/// The single event that happened during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickEvent {
    /// The oldest queued message was consumed.
    Received {
        /// Timestamp carried by the message.
        timestamp: u64,
        /// Rank that sent it.
        from: Rank,
        /// Inbound queue length after the pop.
        queue_len: usize,
    },
    /// Sent to the first peer.
    SentToOne,
    /// Sent to the second peer.
    SentToOther,
    /// Sent the same message to every peer.
    SentToAll { recipients: usize },
    /// No network action.
    Internal,
}

impl TickEvent {
    /// Whether this event put at least one message on the wire.
    pub fn is_send(&self) -> bool {
        matches!(
            self,
            TickEvent::SentToOne | TickEvent::SentToOther | TickEvent::SentToAll { .. }
        )
    }
}

impl fmt::Display for TickEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickEvent::Received {
                timestamp,
                from,
                queue_len,
            } => write!(
                f,
                "received logical clock {} from process {}, message queue length {}",
                timestamp, from, queue_len
            ),
            TickEvent::SentToOne => write!(f, "sending to one process"),
            TickEvent::SentToOther => write!(f, "sending to other process"),
            TickEvent::SentToAll { recipients: 2 } => write!(f, "sending to both processes"),
            TickEvent::SentToAll { recipients } => {
                write!(f, "sending to all {} processes", recipients)
            }
            TickEvent::Internal => write!(f, "internal event"),
        }
    }
}

impl FromStr for TickEvent {
    type Err = ParseRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ParseRecordError::UnknownEvent(s.to_string());

        match s {
            "sending to one process" => return Ok(TickEvent::SentToOne),
            "sending to other process" => return Ok(TickEvent::SentToOther),
            "sending to both processes" => return Ok(TickEvent::SentToAll { recipients: 2 }),
            "internal event" => return Ok(TickEvent::Internal),
            _ => {}
        }

        if let Some(rest) = s.strip_prefix("received logical clock ") {
            let (timestamp, rest) = rest.split_once(" from process ").ok_or_else(unknown)?;
            let (from, queue_len) = rest
                .split_once(", message queue length ")
                .ok_or_else(unknown)?;
            return Ok(TickEvent::Received {
                timestamp: timestamp.parse().map_err(|_| unknown())?,
                from: Rank(from.parse().map_err(|_| unknown())?),
                queue_len: queue_len.parse().map_err(|_| unknown())?,
            });
        }

        if let Some(count) = s
            .strip_prefix("sending to all ")
            .and_then(|rest| rest.strip_suffix(" processes"))
        {
            return Ok(TickEvent::SentToAll {
                recipients: count.parse().map_err(|_| unknown())?,
            });
        }

        Err(unknown())
    }
}

/// One line of a process trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickRecord {
    /// Wall-clock milliseconds since the Unix epoch. Observability only.
    pub wall_clock_ms: u64,
    /// Logical clock at the start of the tick.
    pub logical_clock: LogicalClock,
    /// Rank of the recording process.
    pub rank: Rank,
    /// What happened.
    pub event: TickEvent,
}

impl fmt::Display for TickRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}: {}",
            self.wall_clock_ms, self.logical_clock, self.rank, self.event
        )
    }
}

impl FromStr for TickRecord {
    type Err = ParseRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        let (header, description) = line
            .split_once(": ")
            .ok_or_else(|| ParseRecordError::MissingSeparator(line.to_string()))?;

        let malformed = || ParseRecordError::MalformedHeader(header.to_string());
        let mut fields = header.split(',');
        let mut next_field = || fields.next().ok_or_else(malformed);
        let wall_clock_ms = next_field()?.parse().map_err(|_| malformed())?;
        let logical_clock = LogicalClock(next_field()?.parse().map_err(|_| malformed())?);
        let rank = Rank(next_field()?.parse().map_err(|_| malformed())?);
        if fields.next().is_some() {
            return Err(malformed());
        }

        Ok(TickRecord {
            wall_clock_ms,
            logical_clock,
            rank,
            event: description.parse()?,
        })
    }
}
