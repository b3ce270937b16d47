//! Trace summaries for drift and causality analysis.

use lamport_core::{TickEvent, TickRecord};
use lamport_types::LogicalClock;

/// Aggregate view of one process trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSummary {
    /// Number of records.
    pub ticks: usize,
    /// Receive events.
    pub received: usize,
    /// Sends to the first peer.
    pub sent_to_one: usize,
    /// Sends to the second peer.
    pub sent_to_other: usize,
    /// Broadcasts.
    pub sent_to_all: usize,
    /// Internal events.
    pub internal: usize,
    /// Logical clock at the start of the last tick.
    pub last_clock: LogicalClock,
    /// Largest clock advance between two consecutive ticks.
    ///
    /// Local events advance by exactly 1, so anything larger is a receive
    /// catching up with a faster sender.
    pub largest_jump: u64,
    /// Longest inbound queue observed after a receive.
    pub longest_queue: usize,
}

impl TraceSummary {
    /// Summarise a trace in record order.
    pub fn from_records(records: &[TickRecord]) -> Self {
        let mut summary = TraceSummary {
            ticks: records.len(),
            ..Default::default()
        };

        for record in records {
            match record.event {
                TickEvent::Received { queue_len, .. } => {
                    summary.received += 1;
                    summary.longest_queue = summary.longest_queue.max(queue_len);
                }
                TickEvent::SentToOne => summary.sent_to_one += 1,
                TickEvent::SentToOther => summary.sent_to_other += 1,
                TickEvent::SentToAll { .. } => summary.sent_to_all += 1,
                TickEvent::Internal => summary.internal += 1,
            }
        }

        summary.largest_jump = records
            .windows(2)
            .map(|pair| {
                pair[1]
                    .logical_clock
                    .value()
                    .saturating_sub(pair[0].logical_clock.value())
            })
            .max()
            .unwrap_or(0);
        summary.last_clock = records
            .last()
            .map(|r| r.logical_clock)
            .unwrap_or_default();
        summary
    }

    /// Whether every tick advanced the clock.
    pub fn is_monotonic(records: &[TickRecord]) -> bool {
        records
            .windows(2)
            .all(|pair| pair[1].logical_clock > pair[0].logical_clock)
    }

    /// Number of events that put a message on the wire.
    pub fn sends(&self) -> usize {
        self.sent_to_one + self.sent_to_other + self.sent_to_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_types::Rank;

    fn record(clock: u64, event: TickEvent) -> TickRecord {
        TickRecord {
            wall_clock_ms: 0,
            logical_clock: LogicalClock(clock),
            rank: Rank(1),
            event,
        }
    }

    #[test]
    fn test_counts_and_jumps() {
        let records = [
            record(0, TickEvent::Internal),
            record(1, TickEvent::SentToOne),
            record(
                2,
                TickEvent::Received {
                    timestamp: 8,
                    from: Rank(0),
                    queue_len: 1,
                },
            ),
            record(
                10,
                TickEvent::Received {
                    timestamp: 3,
                    from: Rank(2),
                    queue_len: 0,
                },
            ),
            record(11, TickEvent::SentToAll { recipients: 2 }),
        ];

        let summary = TraceSummary::from_records(&records);
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.received, 2);
        assert_eq!(summary.sends(), 2);
        assert_eq!(summary.internal, 1);
        assert_eq!(summary.largest_jump, 8);
        assert_eq!(summary.longest_queue, 1);
        assert_eq!(summary.last_clock, LogicalClock(11));
        assert!(TraceSummary::is_monotonic(&records));
    }

    #[test]
    fn test_detects_non_monotonic_trace() {
        let records = [record(3, TickEvent::Internal), record(3, TickEvent::Internal)];
        assert!(!TraceSummary::is_monotonic(&records));
    }

    #[test]
    fn test_empty_trace() {
        let summary = TraceSummary::from_records(&[]);
        assert_eq!(summary, TraceSummary::default());
        assert!(TraceSummary::is_monotonic(&[]));
    }
}
