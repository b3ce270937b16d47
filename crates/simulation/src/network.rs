//! In-memory peer links.

use lamport_messages::WireMessage;
use lamport_types::Rank;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Configuration for the simulated links.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Delay between a send and the message becoming drainable.
    ///
    /// The same for every link, so per-link FIFO order is kept.
    pub latency: Duration,
}

impl NetworkConfig {
    /// Links with a fixed one-way latency.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

/// A message on its way across one link.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    deliver_at: Duration,
    message: WireMessage,
}

/// One FIFO queue per directed link.
///
/// Stands in for the per-pair duplex channels: each direction of a pair is a
/// queue, nothing is lost and nothing overtakes on the same link.
#[derive(Debug, Default)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    /// (from, to) -> messages in send order.
    links: BTreeMap<(Rank, Rank), VecDeque<InFlight>>,
}

impl SimulatedNetwork {
    /// Create an empty network.
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            links: BTreeMap::new(),
        }
    }

    /// Queue `message` on the link `from -> to` at virtual time `now`.
    pub fn send(&mut self, now: Duration, from: Rank, to: Rank, message: WireMessage) {
        self.links.entry((from, to)).or_default().push_back(InFlight {
            deliver_at: now + self.config.latency,
            message,
        });
    }

    /// Take every message that has arrived at `to` by `now`.
    ///
    /// Peers are swept in the given order, and each link in arrival order,
    /// the same way the production runner drains its channels.
    pub fn drain(&mut self, now: Duration, to: Rank, peers: &[Rank]) -> Vec<WireMessage> {
        let mut drained = Vec::new();
        for &from in peers {
            let Some(link) = self.links.get_mut(&(from, to)) else {
                continue;
            };
            while link.front().is_some_and(|m| m.deliver_at <= now) {
                if let Some(in_flight) = link.pop_front() {
                    drained.push(in_flight.message);
                }
            }
        }
        drained
    }

    /// Number of messages sent but not yet drained.
    pub fn in_flight(&self) -> usize {
        self.links.values().map(VecDeque::len).sum()
    }
}
