//! Production tick loop for one process.
//!
//! Each tick: check for shutdown, drain every peer without waiting, hand one
//! `Event::Tick` to the state machine, perform its sends, write its record,
//! then sleep for the tick period. The sleep is cut short by shutdown.
//!
//! Leaving the world is a half-close: a stopping process shuts down the write
//! side of every channel. A peer that reads end-of-stream at a record boundary
//! drops that channel, stops sending to it and keeps ticking. A process that
//! stopped on its tick budget keeps reading (and discarding) until every peer
//! has closed its side too, so nothing a slower peer sends ever hits a dead
//! socket.

use crate::network::{ChannelError, PeerSet};
use crate::trace::TraceSink;
use lamport_core::{Action, Event, StateMachine};
use lamport_node::ProcessStateMachine;
use lamport_types::{LogicalClock, Rank};
use std::collections::BTreeSet;
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors that end the tick loop. All are fatal to the process.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Failed to write trace: {0}")]
    Trace(#[source] io::Error),
}

/// Why the loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    TickBudget,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub final_clock: LogicalClock,
    pub stopped_by: StopReason,
}

/// Drives one [`ProcessStateMachine`] over real channels and a trace sink.
pub struct ProcessRunner<S, T> {
    state: ProcessStateMachine,
    peers: PeerSet<S>,
    sink: T,
    shutdown: CancellationToken,
    max_ticks: Option<u64>,
    ticks: u64,
    /// Peers that closed their side; sends to them are skipped.
    departed: BTreeSet<Rank>,
}

impl<S, T> ProcessRunner<S, T>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: TraceSink,
{
    pub fn new(
        state: ProcessStateMachine,
        peers: PeerSet<S>,
        sink: T,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            peers,
            sink,
            shutdown,
            max_ticks: None,
            ticks: 0,
            departed: BTreeSet::new(),
        }
    }

    /// Stop after `max_ticks` ticks. `None` runs until shutdown.
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn state(&self) -> &ProcessStateMachine {
        &self.state
    }

    pub fn sink(&self) -> &T {
        &self.sink
    }

    /// Peers that have left the world, ascending.
    pub fn departed(&self) -> impl Iterator<Item = Rank> + '_ {
        self.departed.iter().copied()
    }

    /// Run the loop to completion.
    ///
    /// Channels are shut down on every exit path. On error a diagnostic line
    /// is written to the sink before the error is returned.
    pub async fn run(&mut self) -> Result<RunSummary, RunnerError> {
        let result = self.run_loop().await;

        match &result {
            Ok(summary) => {
                info!(
                    rank = %self.state.rank(),
                    ticks = summary.ticks,
                    clock = %summary.final_clock,
                    stopped_by = ?summary.stopped_by,
                    "Process stopped"
                );
                self.leave(summary.stopped_by).await;
            }
            Err(e) => {
                error!(rank = %self.state.rank(), error = %e, "Process failed");
                if let Err(write_error) = self.sink.diagnostic(&e.to_string()) {
                    error!(error = %write_error, "Could not write diagnostic");
                }
            }
        }

        self.peers.shutdown_all().await;
        result
    }

    async fn run_loop(&mut self) -> Result<RunSummary, RunnerError> {
        let shutdown = self.shutdown.clone();
        loop {
            if shutdown.is_cancelled() {
                return Ok(self.summary(StopReason::Shutdown));
            }
            if self.max_ticks.is_some_and(|max| self.ticks >= max) {
                return Ok(self.summary(StopReason::TickBudget));
            }

            self.tick().await?;

            let cancelled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => true,
                _ = tokio::time::sleep(self.state.tick_period()) => false,
            };
            if cancelled {
                return Ok(self.summary(StopReason::Shutdown));
            }
        }
    }

    /// One iteration: drain, decide, act.
    pub async fn tick(&mut self) -> Result<(), RunnerError> {
        self.state.set_time(wall_clock());

        let mut departed = Vec::new();
        for channel in self.peers.iter_mut() {
            loop {
                match channel.poll_pending() {
                    Ok(true) => {
                        let message = channel.read_message().await?;
                        self.state.handle(Event::MessageReceived(message));
                    }
                    Ok(false) => break,
                    Err(ChannelError::Closed { peer }) => {
                        departed.push(peer);
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        for peer in departed {
            self.depart(peer).await;
        }

        for action in self.state.handle(Event::Tick) {
            self.perform(action).await?;
        }
        self.ticks += 1;
        Ok(())
    }

    async fn perform(&mut self, action: Action) -> Result<(), RunnerError> {
        match action {
            Action::Send { to, message } => {
                for peer in to {
                    if self.departed.contains(&peer) {
                        continue;
                    }
                    self.peers.get_mut(peer)?.send_message(&message).await?;
                }
            }
            Action::Record(record) => {
                self.sink.record(&record).map_err(RunnerError::Trace)?;
            }
        }
        Ok(())
    }

    /// Drop the channel to a peer that closed its side at a record boundary.
    async fn depart(&mut self, peer: Rank) {
        warn!(rank = %self.state.rank(), peer = %peer, "Peer departed");
        self.departed.insert(peer);
        if let Some(mut channel) = self.peers.remove(peer) {
            if let Err(e) = channel.shutdown().await {
                debug!(peer = %peer, error = %e, "Channel shutdown failed");
            }
        }
    }

    /// Announce departure to every remaining peer.
    ///
    /// After a budget stop, also wait for each peer to close its side, reading
    /// and discarding whatever it still sends. Cancellation cuts the wait short.
    async fn leave(&mut self, stopped_by: StopReason) {
        for channel in self.peers.iter_mut() {
            if let Err(e) = channel.shutdown().await {
                debug!(peer = %channel.peer(), error = %e, "Channel shutdown failed");
            }
        }
        if stopped_by != StopReason::TickBudget {
            return;
        }

        let shutdown = self.shutdown.clone();
        let peers = &mut self.peers;
        let linger = async move {
            for channel in peers.iter_mut() {
                match channel.discard_until_closed().await {
                    Ok(discarded) => {
                        debug!(peer = %channel.peer(), discarded, "Peer closed")
                    }
                    Err(e) => debug!(peer = %channel.peer(), error = %e, "Peer closed"),
                }
            }
        };
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = linger => {}
        }
    }

    fn summary(&self, stopped_by: StopReason) -> RunSummary {
        RunSummary {
            ticks: self.ticks,
            final_clock: self.state.clock(),
            stopped_by,
        }
    }
}

fn wall_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
