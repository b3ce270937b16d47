//! Peer channels: framed wire messages over a duplex byte stream.
//!
//! A channel never blocks to find out whether anything has arrived. The
//! zero-wait [`PeerChannel::poll_pending`] check reads whatever bytes are
//! already buffered by the OS into a staging buffer; [`PeerChannel::read_message`]
//! then consumes one full record, blocking only for the remainder of a record
//! whose first bytes are already here.
//!
//! A peer that closes its side between two records has left the world in an
//! orderly way and is reported as [`ChannelError::Closed`]. A peer that closes
//! in the middle of a record is reported as [`ChannelError::Truncated`].

use bytes::BytesMut;
use futures::FutureExt;
use lamport_messages::{decode, encode, WireError, WireMessage, WIRE_SIZE};
use lamport_types::Rank;
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Bytes pulled off the stream per availability check.
const READ_CHUNK: usize = 16 * WIRE_SIZE;

/// Errors on a peer channel. All of them are fatal to the owning process.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel to process {peer} closed")]
    Closed { peer: Rank },

    #[error("Channel to process {peer} closed in the middle of a message")]
    Truncated { peer: Rank },

    #[error("I/O error on channel to process {peer}: {source}")]
    Io {
        peer: Rank,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt message from process {peer}: {source}")]
    Wire {
        peer: Rank,
        #[source]
        source: WireError,
    },

    #[error("No channel to process {0}")]
    UnknownPeer(Rank),
}

fn io_error(peer: Rank, source: io::Error) -> ChannelError {
    ChannelError::Io { peer, source }
}

/// One connected duplex channel to a single peer.
#[derive(Debug)]
pub struct PeerChannel<S> {
    peer: Rank,
    stream: S,
    /// Bytes read ahead by `poll_pending`, not yet consumed as a message.
    staged: BytesMut,
}

impl<S> PeerChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream to `peer`.
    pub fn new(peer: Rank, stream: S) -> Self {
        Self {
            peer,
            stream,
            staged: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Rank on the other end.
    pub fn peer(&self) -> Rank {
        self.peer
    }

    /// Check, without waiting, whether message bytes are available.
    ///
    /// A channel closed at a record boundary is reported as
    /// [`ChannelError::Closed`] rather than as "nothing to read", so a
    /// departed peer is noticed on the next drain.
    pub fn poll_pending(&mut self) -> Result<bool, ChannelError> {
        if !self.staged.is_empty() {
            return Ok(true);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let attempt = tokio::task::unconstrained(self.stream.read(&mut chunk)).now_or_never();
        match attempt {
            None => Ok(false),
            Some(Ok(0)) => Err(ChannelError::Closed { peer: self.peer }),
            Some(Ok(n)) => {
                self.staged.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Some(Err(e))
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(false)
            }
            Some(Err(source)) => Err(io_error(self.peer, source)),
        }
    }

    /// Read exactly one message, looping over partial reads.
    pub async fn read_message(&mut self) -> Result<WireMessage, ChannelError> {
        let mut frame = [0u8; WIRE_SIZE];

        let staged = self.staged.len().min(WIRE_SIZE);
        frame[..staged].copy_from_slice(&self.staged.split_to(staged));
        if staged < WIRE_SIZE {
            let peer = self.peer;
            self.stream
                .read_exact(&mut frame[staged..])
                .await
                .map_err(|source| match source.kind() {
                    io::ErrorKind::UnexpectedEof => ChannelError::Truncated { peer },
                    _ => io_error(peer, source),
                })?;
        }

        let message = decode(&frame).map_err(|source| ChannelError::Wire {
            peer: self.peer,
            source,
        })?;
        debug!(peer = %self.peer, timestamp = message.timestamp, "Read message");
        Ok(message)
    }

    /// Write one message, looping over partial writes.
    pub async fn send_message(&mut self, message: &WireMessage) -> Result<(), ChannelError> {
        let peer = self.peer;
        let frame = encode(message);
        self.stream
            .write_all(&frame)
            .await
            .map_err(|source| io_error(peer, source))?;
        self.stream
            .flush()
            .await
            .map_err(|source| io_error(peer, source))?;
        debug!(peer = %peer, timestamp = message.timestamp, "Sent message");
        Ok(())
    }

    /// Read and throw away everything until the peer closes its side.
    ///
    /// Returns the number of bytes discarded.
    pub async fn discard_until_closed(&mut self) -> Result<usize, ChannelError> {
        let mut discarded = self.staged.len();
        self.staged.clear();

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk).await {
                Ok(0) => return Ok(discarded),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(io_error(self.peer, source)),
            }
        }
    }

    /// Shut down the write side of the channel.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        let peer = self.peer;
        self.stream
            .shutdown()
            .await
            .map_err(|source| io_error(peer, source))
    }
}

/// Every channel a process owns, keyed by peer rank.
#[derive(Debug)]
pub struct PeerSet<S> {
    channels: BTreeMap<Rank, PeerChannel<S>>,
}

impl<S> Default for PeerSet<S> {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }
}

impl<S> PeerSet<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. Returns the channel it replaced, if any.
    pub fn insert(&mut self, channel: PeerChannel<S>) -> Option<PeerChannel<S>> {
        self.channels.insert(channel.peer(), channel)
    }

    /// Whether a channel to `peer` exists.
    pub fn contains(&self, peer: Rank) -> bool {
        self.channels.contains_key(&peer)
    }

    /// Channel to `peer`.
    pub fn get_mut(&mut self, peer: Rank) -> Result<&mut PeerChannel<S>, ChannelError> {
        self.channels
            .get_mut(&peer)
            .ok_or(ChannelError::UnknownPeer(peer))
    }

    /// Take the channel to `peer` out of the set.
    pub fn remove(&mut self, peer: Rank) -> Option<PeerChannel<S>> {
        self.channels.remove(&peer)
    }

    /// Channels in ascending peer rank order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerChannel<S>> {
        self.channels.values_mut()
    }

    /// Peer ranks, ascending.
    pub fn ranks(&self) -> Vec<Rank> {
        self.channels.keys().copied().collect()
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if there are no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Shut down and close every channel.
    ///
    /// Errors are logged, not returned: by the time this runs the process is
    /// exiting and a peer that already hung up is expected.
    pub async fn shutdown_all(&mut self) {
        let channels = std::mem::take(&mut self.channels);
        for (peer, mut channel) in channels {
            if let Err(e) = channel.shutdown().await {
                debug!(peer = %peer, error = %e, "Channel shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    fn pair(a: Rank, b: Rank) -> (PeerChannel<DuplexStream>, PeerChannel<DuplexStream>) {
        let (left, right) = duplex(1024);
        // `left` is a's end, talking to b.
        (PeerChannel::new(b, left), PeerChannel::new(a, right))
    }

    fn message(sender: u16, timestamp: u64) -> WireMessage {
        WireMessage {
            sender: Rank(sender),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_nothing_pending_on_idle_channel() {
        let (mut a, _b) = pair(Rank(0), Rank(1));
        assert!(!a.poll_pending().unwrap());
        assert!(!a.poll_pending().unwrap());
    }

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let (mut a, mut b) = pair(Rank(0), Rank(1));
        a.send_message(&message(0, 1)).await.unwrap();
        a.send_message(&message(0, 2)).await.unwrap();

        let mut received = Vec::new();
        while b.poll_pending().unwrap() {
            received.push(b.read_message().await.unwrap());
        }
        assert_eq!(received, vec![message(0, 1), message(0, 2)]);
        assert!(!b.poll_pending().unwrap());
    }

    #[tokio::test]
    async fn test_partial_record_is_completed_by_read() {
        let (left, right) = duplex(64);
        let mut raw = left;
        let mut channel = PeerChannel::new(Rank(0), right);

        let frame = encode(&message(0, 77));
        raw.write_all(&frame[..3]).await.unwrap();
        assert!(channel.poll_pending().unwrap());

        let writer = tokio::spawn(async move {
            tokio::task::yield_now().await;
            raw.write_all(&frame[3..]).await.unwrap();
            raw
        });
        assert_eq!(channel.read_message().await.unwrap(), message(0, 77));
        let _raw = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_peer_is_an_error() {
        let (mut a, b) = pair(Rank(0), Rank(1));
        drop(b);
        assert!(matches!(
            a.poll_pending(),
            Err(ChannelError::Closed { peer: Rank(1) })
        ));
    }

    #[tokio::test]
    async fn test_write_to_closed_peer_fails() {
        let (mut a, b) = pair(Rank(0), Rank(1));
        drop(b);
        let result = a.send_message(&message(0, 3)).await;
        assert!(matches!(result, Err(ChannelError::Io { peer: Rank(1), .. })));
    }

    #[tokio::test]
    async fn test_close_mid_record_is_truncated() {
        let (left, right) = duplex(64);
        let mut raw = left;
        let mut channel = PeerChannel::new(Rank(0), right);

        raw.write_all(&encode(&message(0, 5))[..4]).await.unwrap();
        drop(raw);

        assert!(channel.poll_pending().unwrap());
        assert!(matches!(
            channel.read_message().await,
            Err(ChannelError::Truncated { peer: Rank(0) })
        ));
    }

    #[tokio::test]
    async fn test_discard_until_closed() {
        let (mut a, mut b) = pair(Rank(0), Rank(1));
        a.send_message(&message(0, 1)).await.unwrap();
        a.send_message(&message(0, 2)).await.unwrap();
        assert!(b.poll_pending().unwrap());
        a.shutdown().await.unwrap();

        assert_eq!(b.discard_until_closed().await.unwrap(), 2 * WIRE_SIZE);
        // The write side of `b` is still usable after the peer half-closed.
        b.send_message(&message(1, 9)).await.unwrap();
        assert_eq!(a.read_message().await.unwrap(), message(1, 9));
    }

    #[tokio::test]
    async fn test_peer_set_iterates_ascending() {
        let mut set = PeerSet::new();
        let mut keep = Vec::new();
        for peer in [Rank(3), Rank(0), Rank(2)] {
            let (mine, theirs) = duplex(64);
            set.insert(PeerChannel::new(peer, mine));
            keep.push(theirs);
        }
        assert_eq!(set.ranks(), vec![Rank(0), Rank(2), Rank(3)]);
        let order: Vec<Rank> = set.iter_mut().map(|c| c.peer()).collect();
        assert_eq!(order, vec![Rank(0), Rank(2), Rank(3)]);
        assert!(set.contains(Rank(2)));
        assert_eq!(set.remove(Rank(2)).map(|c| c.peer()), Some(Rank(2)));
        assert!(!set.contains(Rank(2)));
        assert_eq!(set.len(), 2);
        assert!(matches!(
            set.get_mut(Rank(1)),
            Err(ChannelError::UnknownPeer(Rank(1)))
        ));

        set.shutdown_all().await;
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_seen_as_closed() {
        let (mut a, mut b) = pair(Rank(0), Rank(1));
        a.shutdown().await.unwrap();
        assert!(matches!(
            b.poll_pending(),
            Err(ChannelError::Closed { peer: Rank(0) })
        ));
    }
}
