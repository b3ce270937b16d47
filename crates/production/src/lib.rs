//! Production runner for the Lamport clock world.
//!
//! Each rank runs as its own OS process:
//!
//! ```text
//! lamport-world run N
//!   └─ Supervisor ── spawns ──▶ lamport-world process --rank r --world-size N
//!                                 ├─ network::establish  (Unix socket mesh)
//!                                 ├─ ProcessRunner       (tick loop)
//!                                 └─ FileTraceSink       (<data_dir>/process<r>.log)
//! ```
//!
//! The clock logic itself lives in `lamport-node`; this crate only moves bytes,
//! sleeps and writes traces.

pub mod config;
pub mod network;
pub mod process;
pub mod runner;
pub mod supervisor;
pub mod telemetry;
pub mod trace;

pub use config::{ConfigError, WorldConfig};
pub use process::{cancel_on_signal, run_process, ProcessError};
pub use runner::{ProcessRunner, RunSummary, RunnerError, StopReason};
pub use supervisor::{Supervisor, SupervisorError};
pub use telemetry::init_tracing;
pub use trace::{FileTraceSink, MemoryTraceSink, TraceSink};
