//! Lamport clock simulator CLI
//!
//! Runs a world of processes on virtual time and prints a per-process summary
//! of how their logical clocks drifted apart.

use clap::Parser;
use lamport_simulation::{NetworkConfig, SimulationRunner, TraceSummary};
use lamport_types::Rank;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lamport-sim")]
#[command(about = "Deterministic simulation of processes exchanging Lamport-timestamped messages")]
#[command(version)]
struct Cli {
    /// Number of processes
    #[arg(long, default_value = "3")]
    world_size: u16,

    /// Random seed
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Virtual seconds to simulate
    #[arg(long, default_value = "60")]
    duration_secs: u64,

    /// One-way link latency in milliseconds
    #[arg(long, default_value = "0")]
    latency_ms: u64,

    /// Print every trace line
    #[arg(long)]
    print_traces: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let network = NetworkConfig::with_latency(Duration::from_millis(cli.latency_ms));
    let mut runner = SimulationRunner::with_network(cli.world_size, cli.seed, network)?;
    runner.run_until(Duration::from_secs(cli.duration_secs));

    for rank in (0..cli.world_size).map(Rank) {
        let trace = runner.trace(rank);
        if cli.print_traces {
            for record in trace {
                println!("{}", record);
            }
        }

        let summary = TraceSummary::from_records(trace);
        let speed = runner
            .node(rank)
            .map(|node| node.clock_speed().get())
            .unwrap_or_default();
        println!(
            "process {} speed: {} ticks: {} clock: {} received: {} sent: {} internal: {} largest jump: {} longest queue: {}",
            rank,
            speed,
            summary.ticks,
            summary.last_clock,
            summary.received,
            summary.sends(),
            summary.internal,
            summary.largest_jump,
            summary.longest_queue,
        );
    }

    let stats = runner.stats();
    println!(
        "total ticks: {} messages sent: {} received: {} in flight: {}",
        stats.ticks,
        stats.messages_sent,
        stats.messages_received,
        runner.in_flight()
    );

    Ok(())
}
