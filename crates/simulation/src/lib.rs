//! Deterministic simulation runner.
//!
//! This crate runs a whole world of clock engines in one thread, on virtual
//! time, with in-memory FIFO links instead of sockets. Given the same seed,
//! it produces identical traces every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Tick Queue (BTreeSet<EventKey>)                │ │
//! │  │     Ordered by: time, rank, sequence               │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     nodes: Vec<ProcessStateMachine>                │ │
//! │  │     drain links → Event::Tick                      │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Actions → link queues / traces                 │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod event_queue;
mod network;
mod runner;
mod summary;

pub use event_queue::EventKey;
pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationRunner, SimulationStats};
pub use summary::TraceSummary;
