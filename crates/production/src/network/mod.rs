//! Process-to-process transport.
//!
//! - [`channel`]: one framed duplex stream per peer with a zero-wait
//!   availability check
//! - [`mesh`]: Unix domain socket bootstrap that connects every pair of ranks

mod channel;
mod mesh;

pub use channel::{ChannelError, PeerChannel, PeerSet};
pub use mesh::{establish, MeshConfig, MeshError};
