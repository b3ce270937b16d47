//! Lamport clock world CLI
//!
//! `run` starts a whole world and supervises it; `process` runs a single rank
//! and is what `run` spawns.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lamport_production::{
    cancel_on_signal, init_tracing, run_process, Supervisor, WorldConfig,
};
use lamport_types::Rank;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Parser)]
#[command(name = "lamport-world")]
#[command(about = "Processes exchanging Lamport-timestamped messages over Unix sockets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn one process per rank and supervise them
    Run {
        /// Number of processes
        world_size: u16,

        #[command(flatten)]
        options: WorldOptions,
    },

    /// Run a single process
    Process {
        /// Rank of this process
        #[arg(long)]
        rank: u16,

        /// Number of processes in the world
        #[arg(long)]
        world_size: u16,

        #[command(flatten)]
        options: WorldOptions,
    },
}

/// Flags shared by both subcommands. They override the config file.
#[derive(Args)]
struct WorldOptions {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for trace files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for listening sockets
    #[arg(long)]
    socket_dir: Option<PathBuf>,

    /// Stop each process after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Base random seed; rank r uses seed + r
    #[arg(long)]
    seed: Option<u64>,
}

impl WorldOptions {
    fn resolve(&self) -> anyhow::Result<WorldConfig> {
        let mut config = match &self.config {
            Some(path) => WorldConfig::load(path)?,
            None => WorldConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.socket_dir {
            config.socket_dir = dir.clone();
        }
        if self.max_ticks.is_some() {
            config.max_ticks = self.max_ticks;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }

    /// Arguments forwarded to every child. Data dir and seed are passed by
    /// the supervisor itself.
    fn child_args(&self, config: &WorldConfig) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(path) = &self.config {
            args.push("--config".into());
            args.push(path.into());
        }
        args.push("--socket-dir".into());
        args.push(config.socket_dir.clone().into());
        if let Some(max_ticks) = config.max_ticks {
            args.push("--max-ticks".into());
            args.push(max_ticks.to_string().into());
        }
        args
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone()).context("Failed to install signal handlers")?;

    match cli.command {
        Commands::Run {
            world_size,
            options,
        } => {
            let config = options.resolve()?;
            let program = std::env::current_exe().context("Failed to locate own executable")?;
            let supervisor = Supervisor::new(program, world_size, &config.data_dir)?
                .with_seed(config.seed)
                .with_child_args(options.child_args(&config));

            if let Err(e) = supervisor.run(shutdown).await {
                error!(error = %e, "World failed");
                return Err(e.into());
            }
        }

        Commands::Process {
            rank,
            world_size,
            options,
        } => {
            let config = options.resolve()?;
            if let Err(e) = run_process(Rank(rank), world_size, &config, shutdown).await {
                error!(rank, error = %e, "Process failed");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
