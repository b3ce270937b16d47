//! World topology: which ranks exist and how their channels are established.

use crate::Rank;
use thiserror::Error;

/// Errors from building a [`Topology`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Rank {rank} must be smaller than world size {world_size}")]
    RankOutOfRange { rank: Rank, world_size: u16 },

    #[error("World size {0} is too small, at least 2 processes are required")]
    WorldTooSmall(u16),
}

/// Full-mesh topology as seen from one process.
///
/// Every pair of ranks shares exactly one channel. The lower rank of a pair
/// accepts and the higher rank connects, so no rendezvous service is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    local: Rank,
    world_size: u16,
}

impl Topology {
    /// Create the topology for `local` in a world of `world_size` processes.
    pub fn new(local: Rank, world_size: u16) -> Result<Self, TopologyError> {
        if world_size < 2 {
            return Err(TopologyError::WorldTooSmall(world_size));
        }
        if local.0 >= world_size {
            return Err(TopologyError::RankOutOfRange {
                rank: local,
                world_size,
            });
        }
        Ok(Self { local, world_size })
    }

    /// Get the local process rank.
    pub fn local_rank(&self) -> Rank {
        self.local
    }

    /// Get the total number of processes.
    pub fn world_size(&self) -> u16 {
        self.world_size
    }

    /// All ranks in the world, ascending.
    pub fn ranks(&self) -> impl Iterator<Item = Rank> {
        (0..self.world_size).map(Rank)
    }

    /// Every other rank, ascending. Always `world_size - 1` entries.
    pub fn peers(&self) -> Vec<Rank> {
        self.ranks().filter(|r| *r != self.local).collect()
    }

    /// Number of peers.
    pub fn num_peers(&self) -> usize {
        usize::from(self.world_size) - 1
    }

    /// Ranks whose connections this process accepts (all higher ranks).
    pub fn accepts_from(&self) -> Vec<Rank> {
        (self.local.0 + 1..self.world_size).map(Rank).collect()
    }

    /// Ranks this process connects to (all lower ranks).
    pub fn connects_to(&self) -> Vec<Rank> {
        (0..self.local.0).map(Rank).collect()
    }

    /// Whether this process needs a listening socket.
    ///
    /// The highest rank has nobody above it to accept from.
    pub fn listens(&self) -> bool {
        self.local.0 + 1 != self.world_size
    }

    /// Check whether `rank` belongs to this world and is not the local rank.
    pub fn is_peer(&self, rank: Rank) -> bool {
        rank.0 < self.world_size && rank != self.local
    }

    /// Number of channels in the whole world: `N * (N - 1) / 2`.
    pub fn num_links(&self) -> usize {
        let n = usize::from(self.world_size);
        n * (n - 1) / 2
    }
}
