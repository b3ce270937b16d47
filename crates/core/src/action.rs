//! Outbound actions requested by the clock engine.

use crate::TickRecord;
use lamport_messages::WireMessage;
use lamport_types::Rank;

/// Which peers a send event targets.
///
/// Selected by the random draw of a tick with an empty inbound queue:
/// 1 → [`First`](Self::First), 2 → [`Second`](Self::Second),
/// 3 → [`All`](Self::All).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendTarget {
    /// The lowest-ranked peer.
    First,
    /// The second-lowest-ranked peer (the only peer in a two-process world).
    Second,
    /// Every peer, with the same payload.
    All,
}

impl SendTarget {
    /// Map a draw from `[1, 10]` to a send target, `None` for internal events.
    pub fn from_draw(draw: u32) -> Option<Self> {
        match draw {
            1 => Some(SendTarget::First),
            2 => Some(SendTarget::Second),
            3 => Some(SendTarget::All),
            _ => None,
        }
    }

    /// Resolve against the ascending list of peers.
    pub fn resolve(&self, peers: &[Rank]) -> Vec<Rank> {
        match self {
            SendTarget::First => peers.first().copied().into_iter().collect(),
            SendTarget::Second => peers
                .get(1)
                .or_else(|| peers.first())
                .copied()
                .into_iter()
                .collect(),
            SendTarget::All => peers.to_vec(),
        }
    }
}

/// Actions the runner must carry out, in the order returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write `message` synchronously to each listed peer channel.
    Send { to: Vec<Rank>, message: WireMessage },

    /// Append the tick's record to the trace and flush it.
    Record(TickRecord),
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Send { .. } => "Send",
            Action::Record(_) => "Record",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_draw() {
        assert_eq!(SendTarget::from_draw(1), Some(SendTarget::First));
        assert_eq!(SendTarget::from_draw(2), Some(SendTarget::Second));
        assert_eq!(SendTarget::from_draw(3), Some(SendTarget::All));
        for draw in 4..=10 {
            assert_eq!(SendTarget::from_draw(draw), None);
        }
    }

    #[test]
    fn test_resolve_three_process_world() {
        let peers = [Rank(0), Rank(2)];
        assert_eq!(SendTarget::First.resolve(&peers), vec![Rank(0)]);
        assert_eq!(SendTarget::Second.resolve(&peers), vec![Rank(2)]);
        assert_eq!(SendTarget::All.resolve(&peers), vec![Rank(0), Rank(2)]);
    }

    #[test]
    fn test_resolve_single_peer() {
        let peers = [Rank(1)];
        assert_eq!(SendTarget::First.resolve(&peers), vec![Rank(1)]);
        assert_eq!(SendTarget::Second.resolve(&peers), vec![Rank(1)]);
        assert_eq!(SendTarget::All.resolve(&peers), vec![Rank(1)]);
    }

    #[test]
    fn test_resolve_all_covers_large_world() {
        let peers: Vec<Rank> = (1..6).map(Rank).collect();
        assert_eq!(SendTarget::All.resolve(&peers), peers);
        assert_eq!(SendTarget::Second.resolve(&peers), vec![Rank(2)]);
    }
}
