//! Full-mesh bootstrap over Unix domain sockets.
//!
//! For a world of N processes every pair gets one stream. The lower rank of a
//! pair listens and accepts, the higher rank connects, retrying until the
//! listener exists. Right after connecting, the connector sends its rank as a
//! 2-byte little-endian handshake so the acceptor knows who is on the line.
//!
//! ```text
//! rank 0: bind ──────────────────────── accept(1), accept(2)
//! rank 1: bind ── connect(0) ────────── accept(2)
//! rank 2:         connect(0), connect(1)
//! ```
//!
//! A connect completes as soon as the listener is bound (the kernel queues
//! it), so connecting before accepting cannot deadlock.

use super::{PeerChannel, PeerSet};
use lamport_types::{Rank, Topology};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// Errors while establishing the mesh. Fatal to the process.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Could not bind the socket on socket path {}: {source}", .path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not accept the connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Could not connect to process {rank} at {}: {source}", .path.display())]
    Connect {
        rank: Rank,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {timeout:?} connecting to process {rank} at {}", .path.display())]
    ConnectTimeout {
        rank: Rank,
        path: PathBuf,
        timeout: Duration,
    },

    #[error("Handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("Unexpected handshake from rank {0}")]
    UnexpectedPeer(Rank),
}

/// Where sockets live and how long to wait for listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshConfig {
    /// Directory holding the listening sockets.
    pub socket_dir: PathBuf,
    /// File name prefix; the rank is appended.
    pub socket_prefix: String,
    /// Give up connecting to a lower rank after this long.
    pub connect_timeout: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from("."),
            socket_prefix: "socket_path_".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl MeshConfig {
    /// Path of the listening socket owned by `rank`.
    pub fn socket_path(&self, rank: Rank) -> PathBuf {
        self.socket_dir
            .join(format!("{}{}", self.socket_prefix, rank))
    }
}

/// Open one stream to every peer of `topology`.
///
/// The listening socket only lives for the duration of the bootstrap: its
/// path is unlinked before returning, on success and on error alike.
pub async fn establish(
    topology: &Topology,
    config: &MeshConfig,
) -> Result<PeerSet<UnixStream>, MeshError> {
    let local = topology.local_rank();

    let listener = if topology.listens() {
        let path = config.socket_path(local);
        Some((bind(&path)?, path))
    } else {
        None
    };

    let result = connect_and_accept(
        topology,
        config,
        listener.as_ref().map(|(listener, _)| listener),
    )
    .await;

    if let Some((listener, path)) = listener {
        drop(listener);
        remove_socket(&path);
    }

    let peers = result?;
    info!(rank = %local, peers = peers.len(), "Mesh established");
    Ok(peers)
}

async fn connect_and_accept(
    topology: &Topology,
    config: &MeshConfig,
    listener: Option<&UnixListener>,
) -> Result<PeerSet<UnixStream>, MeshError> {
    let local = topology.local_rank();
    let mut peers = PeerSet::new();

    for peer in topology.connects_to() {
        let stream = connect(local, peer, config).await?;
        peers.insert(PeerChannel::new(peer, stream));
    }

    if let Some(listener) = listener {
        let expected = topology.accepts_from();
        for _ in 0..expected.len() {
            let (mut stream, _) = listener.accept().await.map_err(MeshError::Accept)?;

            let mut hello = [0u8; 2];
            stream
                .read_exact(&mut hello)
                .await
                .map_err(MeshError::Handshake)?;
            let peer = Rank(u16::from_le_bytes(hello));

            if !expected.contains(&peer) || peers.contains(peer) {
                return Err(MeshError::UnexpectedPeer(peer));
            }
            debug!(rank = %local, peer = %peer, "Accepted connection");
            peers.insert(PeerChannel::new(peer, stream));
        }
    }

    Ok(peers)
}

async fn connect(local: Rank, peer: Rank, config: &MeshConfig) -> Result<UnixStream, MeshError> {
    let path = config.socket_path(peer);

    // The listener may not be up yet: yield and retry until it is.
    let attempt = async {
        loop {
            match UnixStream::connect(&path).await {
                Ok(stream) => return Ok(stream),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    tokio::task::yield_now().await;
                }
                Err(source) => {
                    return Err(MeshError::Connect {
                        rank: peer,
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
    };

    let mut stream = tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| MeshError::ConnectTimeout {
            rank: peer,
            path: path.clone(),
            timeout: config.connect_timeout,
        })??;

    stream
        .write_all(&local.0.to_le_bytes())
        .await
        .map_err(MeshError::Handshake)?;
    debug!(rank = %local, peer = %peer, "Connected");
    Ok(stream)
}

fn bind(path: &Path) -> Result<UnixListener, MeshError> {
    // A previous run may have left the path behind.
    remove_socket(path);
    UnixListener::bind(path).map_err(|source| MeshError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove socket"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_messages::WireMessage;

    fn config(dir: &Path) -> MeshConfig {
        MeshConfig {
            socket_dir: dir.to_path_buf(),
            socket_prefix: "sock_".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_socket_path() {
        let config = MeshConfig::default();
        assert_eq!(config.socket_path(Rank(2)), PathBuf::from("./socket_path_2"));
    }

    #[tokio::test]
    async fn test_three_process_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let topologies: Vec<Topology> = (0..3)
            .map(|r| Topology::new(Rank(r), 3).unwrap())
            .collect();

        let (p0, p1, p2) = tokio::join!(
            establish(&topologies[0], &config),
            establish(&topologies[1], &config),
            establish(&topologies[2], &config),
        );
        let mut sets = [p0.unwrap(), p1.unwrap(), p2.unwrap()];

        assert_eq!(sets[0].ranks(), vec![Rank(1), Rank(2)]);
        assert_eq!(sets[1].ranks(), vec![Rank(0), Rank(2)]);
        assert_eq!(sets[2].ranks(), vec![Rank(0), Rank(1)]);

        // Socket files are gone once the mesh is up.
        assert!(!config.socket_path(Rank(0)).exists());
        assert!(!config.socket_path(Rank(1)).exists());

        // Every link carries traffic in both directions.
        let hello = WireMessage {
            sender: Rank(2),
            timestamp: 11,
        };
        sets[2]
            .get_mut(Rank(0))
            .unwrap()
            .send_message(&hello)
            .await
            .unwrap();
        let received = sets[0].get_mut(Rank(2)).unwrap().read_message().await.unwrap();
        assert_eq!(received, hello);

        let reply = WireMessage {
            sender: Rank(0),
            timestamp: 12,
        };
        sets[0]
            .get_mut(Rank(2))
            .unwrap()
            .send_message(&reply)
            .await
            .unwrap();
        let received = sets[2].get_mut(Rank(0)).unwrap().read_message().await.unwrap();
        assert_eq!(received, reply);

        for set in sets.iter_mut() {
            set.shutdown_all().await;
        }
    }

    #[tokio::test]
    async fn test_connect_times_out_without_listener() {
        let dir = tempfile::tempdir().unwrap();
        let config = MeshConfig {
            connect_timeout: Duration::from_millis(50),
            ..config(dir.path())
        };
        let topology = Topology::new(Rank(1), 2).unwrap();

        let result = establish(&topology, &config).await;
        assert!(matches!(
            result,
            Err(MeshError::ConnectTimeout { rank: Rank(0), .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir.path().join("missing"));
        let topology = Topology::new(Rank(0), 2).unwrap();

        let result = establish(&topology, &config).await;
        assert!(matches!(result, Err(MeshError::Bind { .. })));
    }
}
