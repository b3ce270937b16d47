//! Entry point for a single process of the world.

use crate::config::WorldConfig;
use crate::network::{establish, MeshError};
use crate::runner::{ProcessRunner, RunSummary, RunnerError};
use crate::trace::{FileTraceSink, TraceSink};
use lamport_node::ProcessStateMachine;
use lamport_types::{Rank, Topology, TopologyError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("Failed to open trace file in {}: {source}", .dir.display())]
    TraceFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Set up and run process `rank` until shutdown, tick budget or failure.
///
/// Setup failures after the trace file exists are written to it before
/// returning.
pub async fn run_process(
    rank: Rank,
    world_size: u16,
    config: &WorldConfig,
    shutdown: CancellationToken,
) -> Result<RunSummary, ProcessError> {
    let topology = Topology::new(rank, world_size)?;
    let mut sink =
        FileTraceSink::create(&config.data_dir, rank).map_err(|source| ProcessError::TraceFile {
            dir: config.data_dir.clone(),
            source,
        })?;

    let seed = process_seed(config, rank);
    let state = ProcessStateMachine::new(topology, seed);
    let speed = state.clock_speed().get();
    println!("process {} speed: {}", rank, speed);
    info!(rank = %rank, speed, trace = %sink.path().display(), "Process starting");

    let peers = match establish(&topology, &config.mesh()).await {
        Ok(peers) => peers,
        Err(e) => {
            error!(rank = %rank, error = %e, "Mesh bootstrap failed");
            if let Err(write_error) = sink.diagnostic(&e.to_string()) {
                error!(error = %write_error, "Could not write diagnostic");
            }
            return Err(e.into());
        }
    };

    let mut runner =
        ProcessRunner::new(state, peers, sink, shutdown).with_max_ticks(config.max_ticks);
    Ok(runner.run().await?)
}

/// Seed for `rank`: the configured base seed plus the rank, or OS entropy.
///
/// Ranks started with the same base seed still get distinct generators.
fn process_seed(config: &WorldConfig, rank: Rank) -> u64 {
    config
        .seed
        .map(|seed| seed.wrapping_add(u64::from(rank.0)))
        .unwrap_or_else(rand::random)
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
pub fn cancel_on_signal(shutdown: CancellationToken) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = shutdown.cancelled() => return,
        };
        info!(signal = name, "Received signal, shutting down");
        shutdown.cancel();
    });
    Ok(())
}
